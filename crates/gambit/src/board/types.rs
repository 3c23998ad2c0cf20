//! Serializable chess value types.

use serde::{Deserialize, Serialize};

/// Chess piece color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    /// White pieces.
    White,
    /// Black pieces.
    Black,
}

impl Color {
    /// Get the opposite color.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::White => Self::Black,
            Self::Black => Self::White,
        }
    }
}

impl From<shakmaty::Color> for Color {
    fn from(c: shakmaty::Color) -> Self {
        match c {
            shakmaty::Color::White => Self::White,
            shakmaty::Color::Black => Self::Black,
        }
    }
}

impl From<Color> for shakmaty::Color {
    fn from(c: Color) -> Self {
        match c {
            Color::White => Self::White,
            Color::Black => Self::Black,
        }
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::White => write!(f, "white"),
            Self::Black => write!(f, "black"),
        }
    }
}

/// Chess piece type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PieceType {
    Pawn,
    Knight,
    Bishop,
    Rook,
    Queen,
    King,
}

impl From<shakmaty::Role> for PieceType {
    fn from(r: shakmaty::Role) -> Self {
        match r {
            shakmaty::Role::Pawn => Self::Pawn,
            shakmaty::Role::Knight => Self::Knight,
            shakmaty::Role::Bishop => Self::Bishop,
            shakmaty::Role::Rook => Self::Rook,
            shakmaty::Role::Queen => Self::Queen,
            shakmaty::Role::King => Self::King,
        }
    }
}

/// A square on the board (a1-h8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Square(u8);

impl Square {
    /// Create a square from file (0-7) and rank (0-7).
    #[must_use]
    pub const fn new(file: u8, rank: u8) -> Option<Self> {
        if file < 8 && rank < 8 {
            Some(Self(rank * 8 + file))
        } else {
            None
        }
    }

    /// Get the file (0-7, a-h).
    #[must_use]
    pub const fn file(self) -> u8 {
        self.0 % 8
    }

    /// Get the rank (0-7, 1-8).
    #[must_use]
    pub const fn rank(self) -> u8 {
        self.0 / 8
    }
}

impl std::fmt::Display for Square {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let file = (b'a' + self.file()) as char;
        let rank = (b'1' + self.rank()) as char;
        write!(f, "{file}{rank}")
    }
}

impl std::str::FromStr for Square {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 2 {
            return Err("square must be 2 characters");
        }
        let mut chars = s.chars();
        let file = chars.next().ok_or("missing file")?;
        let rank = chars.next().ok_or("missing rank")?;

        if !('a'..='h').contains(&file) {
            return Err("file must be a-h");
        }
        if !('1'..='8').contains(&rank) {
            return Err("rank must be 1-8");
        }

        Self::new((file as u8) - b'a', (rank as u8) - b'1').ok_or("invalid square")
    }
}

/// A UCI move string (e.g. "e2e4", "e7e8q").
///
/// Format-validated only; legality against a position is the job of
/// [`super::BoardPosition`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UciMove(String);

impl UciMove {
    /// Create a new UCI move from a string. Validates the format, not legality.
    pub fn new(s: impl Into<String>) -> Result<Self, &'static str> {
        let s = s.into();
        if s.len() < 4 || s.len() > 5 {
            return Err("UCI move must be 4-5 characters");
        }
        let _from: Square = s[0..2].parse()?;
        let _to: Square = s[2..4].parse()?;
        if s.len() == 5 {
            let promo = s.as_bytes()[4] as char;
            if !['q', 'r', 'b', 'n'].contains(&promo) {
                return Err("promotion must be q, r, b, or n");
            }
        }
        Ok(Self(s))
    }

    /// Get the move as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the source square.
    #[must_use]
    pub fn from_square(&self) -> Square {
        self.0[0..2].parse().expect("validated in constructor")
    }

    /// Get the destination square.
    #[must_use]
    pub fn to_square(&self) -> Square {
        self.0[2..4].parse().expect("validated in constructor")
    }
}

impl std::fmt::Display for UciMove {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for UciMove {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Classification of a move for the arm executor. The executor needs to know
/// whether a capture has to be cleared first, whether two pieces move
/// (castling), and whether the arriving piece changes (promotion).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveKind {
    Normal,
    Capture,
    Castle,
    Promotion,
    EnPassant,
}

impl std::fmt::Display for MoveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Capture => write!(f, "capture"),
            Self::Castle => write!(f, "castle"),
            Self::Promotion => write!(f, "promotion"),
            Self::EnPassant => write!(f, "en_passant"),
        }
    }
}

/// Legal move information for status queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegalMove {
    /// UCI notation (e.g. "e2e4").
    pub uci: String,
    /// SAN notation (e.g. "e4").
    pub san: String,
    /// How the move would be classified for the executor.
    pub kind: MoveKind,
    /// Whether the move gives check.
    pub is_check: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_opposite() {
        assert_eq!(Color::White.opposite(), Color::Black);
        assert_eq!(Color::Black.opposite(), Color::White);
    }

    #[test]
    fn square_roundtrip() {
        let sq = Square::new(4, 3).unwrap();
        assert_eq!(sq.to_string(), "e4");
        let parsed: Square = "e4".parse().unwrap();
        assert_eq!(parsed, sq);
    }

    #[test]
    fn square_bounds() {
        assert!(Square::new(7, 7).is_some());
        assert!(Square::new(8, 0).is_none());
        assert!("i2".parse::<Square>().is_err());
        assert!("e9".parse::<Square>().is_err());
    }

    #[test]
    fn uci_move_valid() {
        let m = UciMove::new("e2e4").unwrap();
        assert_eq!(m.from_square().to_string(), "e2");
        assert_eq!(m.to_square().to_string(), "e4");
        assert!(UciMove::new("e7e8q").is_ok());
    }

    #[test]
    fn uci_move_invalid() {
        assert!(UciMove::new("e2").is_err());
        assert!(UciMove::new("e2e4e5").is_err());
        assert!(UciMove::new("e2e4x").is_err());
        assert!(UciMove::new("i2i4").is_err());
    }
}
