//! Line classification
//!
//! Every input line maps to exactly one `LineKind`. The command words the
//! transformer cares about live in a static table; anything else is `Other`
//! and passes through untouched.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::TransformError;
use crate::parser::lexer::{tokenize_line, Word};

/// Positioning mode switch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeCommand {
    /// G90: absolute XYZ and extruder
    Absolute,
    /// G91: relative XYZ and extruder
    Relative,
    /// M82
    AbsoluteExtruder,
    /// M83
    RelativeExtruder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HomeTarget {
    /// G28 / G161
    Minimum,
    /// G162
    Maximum,
}

/// Axes named by a homing command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisSet {
    pub x: bool,
    pub y: bool,
    pub z: bool,
}

impl AxisSet {
    pub const ALL: AxisSet = AxisSet {
        x: true,
        y: true,
        z: true,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HomeCommand {
    pub target: HomeTarget,
    pub axes: AxisSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveKind {
    /// G0 / G1
    Linear,
    /// G2 / G3
    Arc,
    /// G92
    SetPosition,
}

/// A motion command and its words
#[derive(Debug, Clone, PartialEq)]
pub struct MoveCommand<'a> {
    pub code: &'a str,
    pub kind: MoveKind,
    pub words: Vec<Word<'a>>,
    pub comment: Option<&'a str>,
}

/// Values of the axis parameters on a move, plus the words left as written
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MoveParameters<'a> {
    pub e: Option<f64>,
    pub f: Option<f64>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    pub passthrough: Vec<&'a str>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LineKind<'a> {
    Comment,
    Mode(ModeCommand),
    Home(HomeCommand),
    Move(MoveCommand<'a>),
    Other,
}

#[derive(Debug, Clone, Copy)]
enum CommandClass {
    Mode(ModeCommand),
    Home(HomeTarget),
    Move(MoveKind),
}

const COMMANDS: &[(&str, CommandClass)] = &[
    ("G0", CommandClass::Move(MoveKind::Linear)),
    ("G1", CommandClass::Move(MoveKind::Linear)),
    ("G2", CommandClass::Move(MoveKind::Arc)),
    ("G3", CommandClass::Move(MoveKind::Arc)),
    ("G92", CommandClass::Move(MoveKind::SetPosition)),
    ("G28", CommandClass::Home(HomeTarget::Minimum)),
    ("G161", CommandClass::Home(HomeTarget::Minimum)),
    ("G162", CommandClass::Home(HomeTarget::Maximum)),
    ("G90", CommandClass::Mode(ModeCommand::Absolute)),
    ("G91", CommandClass::Mode(ModeCommand::Relative)),
    ("M82", CommandClass::Mode(ModeCommand::AbsoluteExtruder)),
    ("M83", CommandClass::Mode(ModeCommand::RelativeExtruder)),
];

fn number_pattern() -> &'static Regex {
    static NUMBER: OnceLock<Regex> = OnceLock::new();
    NUMBER.get_or_init(|| {
        Regex::new(r"^[-+]?(\d+\.?\d*|\.\d+)$").expect("invalid number pattern")
    })
}

/// Classify a line of GCode
pub fn classify_line(line: &str) -> LineKind<'_> {
    if line.trim_start().starts_with(';') {
        return LineKind::Comment;
    }

    let lexed = tokenize_line(line);
    let Some((first, rest)) = lexed.words.split_first() else {
        return LineKind::Other;
    };

    let Some(&(_, class)) = COMMANDS.iter().find(|(code, _)| *code == first.text) else {
        return LineKind::Other;
    };

    match class {
        CommandClass::Mode(mode) => LineKind::Mode(mode),
        CommandClass::Home(target) => {
            let named = |axis| rest.iter().any(|w| w.letter == axis);
            let axes = AxisSet {
                x: named('X'),
                y: named('Y'),
                z: named('Z'),
            };
            let axes = if axes.x || axes.y || axes.z {
                axes
            } else {
                AxisSet::ALL
            };
            LineKind::Home(HomeCommand { target, axes })
        }
        CommandClass::Move(kind) => LineKind::Move(MoveCommand {
            code: first.text,
            kind,
            words: rest.to_vec(),
            comment: lexed.comment,
        }),
    }
}

impl<'a> MoveCommand<'a> {
    /// Extract the E, F, X, Y and Z values.
    ///
    /// `line` is the 1-based line number used in error reports.
    pub fn parameters(&self, line: usize) -> Result<MoveParameters<'a>, TransformError> {
        let mut params = MoveParameters::default();

        for word in &self.words {
            let slot = match word.letter {
                'E' => &mut params.e,
                'F' => &mut params.f,
                'X' => &mut params.x,
                'Y' => &mut params.y,
                'Z' => &mut params.z,
                _ => {
                    params.passthrough.push(word.text);
                    continue;
                }
            };

            if slot.is_some() {
                return Err(TransformError::AmbiguousParameter {
                    line,
                    letter: word.letter,
                });
            }

            let value = number_pattern()
                .is_match(word.value)
                .then(|| word.value.parse::<f64>().ok())
                .flatten()
                .ok_or_else(|| TransformError::MalformedParameter {
                    line,
                    text: word.text.to_string(),
                })?;
            *slot = Some(value);
        }

        Ok(params)
    }
}
