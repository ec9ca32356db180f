//! GCode Parser
//!
//! Tokenizes lines and classifies them into the small command subset the
//! transformer rewrites.

pub mod lexer;
pub mod line;

pub use lexer::{tokenize_line, LexedLine, Word};
pub use line::{
    classify_line, AxisSet, HomeCommand, HomeTarget, LineKind, ModeCommand, MoveCommand,
    MoveKind, MoveParameters,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_program() {
        let program = "; generated\nG90\nM83\nG28\nG1 X10 Y20 F3000\nM104 S200";
        let kinds: Vec<_> = program.lines().map(classify_line).collect();

        assert_eq!(kinds[0], LineKind::Comment);
        assert_eq!(kinds[1], LineKind::Mode(ModeCommand::Absolute));
        assert_eq!(kinds[2], LineKind::Mode(ModeCommand::RelativeExtruder));
        assert!(matches!(kinds[3], LineKind::Home(_)));
        assert!(matches!(kinds[4], LineKind::Move(ref m) if m.code == "G1"));
        assert_eq!(kinds[5], LineKind::Other);
    }
}
