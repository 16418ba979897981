//! Parser for the rearrangement move log written by the control software.
//!
//! The log is a sequence of entries, one per repetition:
//!
//! ```text
//! Rep # 0
//! Source: 1; 0; 1; 1;
//! Target Location: 0 1
//! Moves:
//! 0 1 2
//! 0 1
//!
//! 1 0 0
//! 2 3
//! 2 4
//! ```
//!
//! A move block starts with `<index> <flashed> <direction>` and lists one
//! `<row> <col>` line per atom moved in parallel.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RearrangeLogError {
    #[error("failed to read move log {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },
    #[error("line {line}: '{text}' appears before the first 'Rep #' line")]
    OutsideEntry { line: usize, text: String },
    #[error("line {line}: direction {value} is not one of 0 (up), 1 (down), 2 (left), 3 (right)")]
    InvalidDirection { line: usize, value: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    fn from_code(value: usize, line: usize) -> Result<Self, RearrangeLogError> {
        match value {
            0 => Ok(Direction::Up),
            1 => Ok(Direction::Down),
            2 => Ok(Direction::Left),
            3 => Ok(Direction::Right),
            _ => Err(RearrangeLogError::InvalidDirection { line, value }),
        }
    }

    pub fn letter(&self) -> char {
        match self {
            Direction::Up => 'U',
            Direction::Down => 'D',
            Direction::Left => 'L',
            Direction::Right => 'R',
        }
    }
}

/// One tweezer sweep, possibly carrying several atoms at once
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Move {
    /// Whether the static traps were flashed off during the sweep
    pub flashed: bool,
    pub direction: Direction,
    /// Starting `(row, col)` of every atom moved
    pub atoms: Vec<(usize, usize)>,
}

impl Move {
    pub fn is_parallel(&self) -> bool {
        self.atoms.len() > 1
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (row, col) in &self.atoms {
            write!(f, "({row},{col})")?;
        }
        write!(f, "{}", self.direction.letter())
    }
}

/// Everything logged for one repetition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RearrangeEntry {
    pub repetition: usize,
    /// Loading pattern seen by the rearrangement algorithm
    pub source: Vec<bool>,
    pub target_location: Option<(usize, usize)>,
    pub moves: Vec<Move>,
}

impl RearrangeEntry {
    pub fn loaded(&self) -> usize {
        self.source.iter().filter(|&&s| s).count()
    }

    /// Category name listing every move, or `No-Move`
    pub fn description(&self) -> String {
        if self.moves.is_empty() {
            return "No-Move".to_string();
        }
        self.moves
            .iter()
            .map(Move::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn syntax(line: usize, message: impl Into<String>) -> RearrangeLogError {
    RearrangeLogError::Syntax {
        line,
        message: message.into(),
    }
}

fn numbers(text: &str, line: usize) -> Result<Vec<usize>, RearrangeLogError> {
    text.split_whitespace()
        .map(|t| {
            t.parse::<usize>()
                .map_err(|_| syntax(line, format!("'{t}' is not a number")))
        })
        .collect()
}

fn parse_source(text: &str, line: usize) -> Result<Vec<bool>, RearrangeLogError> {
    text.split(';')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| match t {
            "1" | "true" | "True" => Ok(true),
            "0" | "false" | "False" => Ok(false),
            other => Err(syntax(line, format!("'{other}' is not a loading flag"))),
        })
        .collect()
}

/// Parse a move log.
///
/// # Arguments
/// * `text` - Log contents
/// * `limit` - Read at most this many lines; `None` reads everything
pub fn parse_rearrange_log(
    text: &str,
    limit: Option<usize>,
) -> Result<Vec<RearrangeEntry>, RearrangeLogError> {
    let mut entries: Vec<RearrangeEntry> = Vec::new();
    let mut in_moves = false;

    for (index, raw) in text.lines().take(limit.unwrap_or(usize::MAX)).enumerate() {
        let line = index + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(rest) = trimmed.strip_prefix("Rep #") {
            let repetition = rest
                .trim()
                .parse()
                .map_err(|_| syntax(line, format!("bad repetition number '{}'", rest.trim())))?;
            entries.push(RearrangeEntry {
                repetition,
                ..Default::default()
            });
            in_moves = false;
            continue;
        }

        let entry = entries
            .last_mut()
            .ok_or_else(|| RearrangeLogError::OutsideEntry {
                line,
                text: trimmed.to_string(),
            })?;

        if let Some(rest) = trimmed.strip_prefix("Source:") {
            entry.source = parse_source(rest, line)?;
        } else if let Some(rest) = trimmed.strip_prefix("Target Location:") {
            match numbers(rest, line)?.as_slice() {
                [row, col] => entry.target_location = Some((*row, *col)),
                _ => return Err(syntax(line, "target location needs a row and a column")),
            }
        } else if trimmed.starts_with("Moves:") {
            in_moves = true;
        } else if in_moves {
            match numbers(trimmed, line)?.as_slice() {
                [_, flashed, direction] => entry.moves.push(Move {
                    flashed: *flashed != 0,
                    direction: Direction::from_code(*direction, line)?,
                    atoms: Vec::new(),
                }),
                [row, col] => entry
                    .moves
                    .last_mut()
                    .ok_or_else(|| syntax(line, "atom listed before any move header"))?
                    .atoms
                    .push((*row, *col)),
                _ => return Err(syntax(line, format!("unexpected move line '{trimmed}'"))),
            }
        } else {
            return Err(syntax(line, format!("unexpected line '{trimmed}'")));
        }
    }

    log::debug!("parsed {} rearrangement entries", entries.len());
    Ok(entries)
}

/// Read and parse a move log file
pub fn read_rearrange_log(
    path: &Path,
    limit: Option<usize>,
) -> Result<Vec<RearrangeEntry>, RearrangeLogError> {
    let text = std::fs::read_to_string(path).map_err(|source| RearrangeLogError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_rearrange_log(&text, limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG: &str = "Rep # 0
Source: 1; 0; 1; 1;
Target Location: 0 1
Moves:
0 1 2
0 1

1 0 3
2 3
2 4

Rep # 1
Source: 1; 1; 1; 1;
Target Location: 0 0
Moves:
";

    #[test]
    fn test_parse_entries() {
        let entries = parse_rearrange_log(LOG, None).unwrap();
        assert_eq!(entries.len(), 2);

        let first = &entries[0];
        assert_eq!(first.source, vec![true, false, true, true]);
        assert_eq!(first.loaded(), 3);
        assert_eq!(first.target_location, Some((0, 1)));
        assert_eq!(first.moves.len(), 2);
        assert!(first.moves[0].flashed);
        assert_eq!(first.moves[0].direction, Direction::Left);
        assert!(!first.moves[1].flashed);
        assert!(first.moves[1].is_parallel());
        assert_eq!(first.description(), "(0,1)L, (2,3)(2,4)R");

        assert_eq!(entries[1].repetition, 1);
        assert_eq!(entries[1].description(), "No-Move");
    }

    #[test]
    fn test_limit_truncates() {
        let entries = parse_rearrange_log(LOG, Some(6)).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].moves.len(), 1);
        assert_eq!(entries[0].moves[0].atoms, vec![(0, 1)]);
    }

    #[test]
    fn test_bad_direction() {
        let text = "Rep # 0\nSource: 1;\nMoves:\n0 1 7\n";
        assert!(matches!(
            parse_rearrange_log(text, None),
            Err(RearrangeLogError::InvalidDirection { line: 4, value: 7 })
        ));
    }

    #[test]
    fn test_line_outside_entry() {
        assert!(matches!(
            parse_rearrange_log("Source: 1; 0;\n", None),
            Err(RearrangeLogError::OutsideEntry { line: 1, .. })
        ));
    }
}
