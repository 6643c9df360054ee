//! Built-in starting grids.

use crate::grid::Grid;

const DEAD: [&str; 16] = ["................"; 16];

/// Block, beehive, loaf, boat, and tub.
const STILL_LIFES: [&str; 16] = [
    "................",
    ".##.....##......",
    ".##....#..#.....",
    "........##......",
    "................",
    "................",
    "...##.....##....",
    "..#..#....#.#...",
    "...#.#.....#....",
    "....#...........",
    "................",
    "................",
    ".........#......",
    "........#.#.....",
    ".........#......",
    "................",
];

/// Blinker, toad, and beacon; all period 2.
const OSCILLATORS: [&str; 16] = [
    "................",
    "................",
    "...###..........",
    "...........###..",
    "..........###...",
    "................",
    "................",
    "...##...........",
    "...##...........",
    ".....##.........",
    ".....##.........",
    "................",
    "................",
    "................",
    "................",
    "................",
];

const PULSAR: [&str; 16] = [
    "................",
    "...###...###....",
    "................",
    ".#....#.#....#..",
    ".#....#.#....#..",
    ".#....#.#....#..",
    "...###...###....",
    "................",
    "...###...###....",
    ".#....#.#....#..",
    ".#....#.#....#..",
    ".#....#.#....#..",
    "................",
    "...###...###....",
    "................",
    "................",
];

const GLIDER: [&str; 16] = [
    ".#..............",
    "..#.............",
    "###.............",
    "................",
    "................",
    "................",
    "................",
    "................",
    "................",
    "................",
    "................",
    "................",
    "................",
    "................",
    "................",
    "................",
];

const BUILTIN: [(&str, &[&str; 16]); 5] = [
    ("dead", &DEAD),
    ("still-lifes", &STILL_LIFES),
    ("oscillators", &OSCILLATORS),
    ("pulsar", &PULSAR),
    ("glider", &GLIDER),
];

/// Names accepted by [`builtin_pattern`].
pub fn builtin_names() -> impl Iterator<Item = &'static str> {
    BUILTIN.iter().map(|(name, _)| *name)
}

/// Look up a built-in pattern by name.
pub fn builtin_pattern(name: &str) -> Option<Grid> {
    BUILTIN
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, rows)| Grid::from_rows(&rows[..]).expect("built-in pattern should parse"))
}
