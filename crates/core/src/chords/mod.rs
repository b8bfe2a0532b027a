use serde::Serialize;

use crate::{GuitarError, Result, STRING_COUNT};

/// Fret value marking a string that is not played.
pub const MUTED: i8 = -1;

/// Six fret offsets, lowest string first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Chord {
    pub name: &'static str,
    pub frets: [i8; STRING_COUNT],
}

impl Chord {
    pub const fn new(name: &'static str, frets: [i8; STRING_COUNT]) -> Self {
        Self { name, frets }
    }

    /// Fret held on `string`, or `None` when the string is muted.
    pub fn fret(&self, string: usize) -> Option<u8> {
        self.frets
            .get(string)
            .and_then(|&fret| u8::try_from(fret).ok())
    }

    pub fn sounding_strings(&self) -> usize {
        (0..STRING_COUNT).filter(|&s| self.fret(s).is_some()).count()
    }
}

/// Static table of the chord shapes the strummer knows.
pub struct ChordLibrary;

impl ChordLibrary {
    pub const A_MAJOR: Chord = Chord::new("A_Major", [-1, 0, 1, 2, 3, 0]);
    pub const B_MAJOR: Chord = Chord::new("B_Major", [1, 1, 2, 3, 4, 1]);
    pub const C_MAJOR: Chord = Chord::new("C_Major", [-1, 3, 2, 0, 1, 0]);
    pub const D_MAJOR: Chord = Chord::new("D_Major", [-1, -1, 0, 1, 3, 2]);
    pub const E_MAJOR: Chord = Chord::new("E_Major", [0, 2, 3, 1, 0, 0]);
    pub const G_MAJOR: Chord = Chord::new("G_Major", [2, 1, 0, 0, 0, 3]);
    pub const A_MINOR: Chord = Chord::new("A_Minor", [-1, 0, 2, 3, 1, 0]);
    pub const B_MINOR: Chord = Chord::new("B_Minor", [-1, 1, 3, 4, 2, 1]);
    pub const C_MINOR: Chord = Chord::new("C_Minor", [-1, 1, 3, 4, 2, 1]);
    pub const D_MINOR: Chord = Chord::new("D_Minor", [-1, -1, 0, 2, 3, 1]);
    pub const E_MINOR: Chord = Chord::new("E_Minor", [-1, 2, 3, 0, 0, 0]);
    pub const G_MINOR: Chord = Chord::new("G_Minor", [1, 3, 4, 0, 1, 0]);

    const ALL: [Chord; 12] = [
        Self::A_MAJOR,
        Self::B_MAJOR,
        Self::C_MAJOR,
        Self::D_MAJOR,
        Self::E_MAJOR,
        Self::G_MAJOR,
        Self::A_MINOR,
        Self::B_MINOR,
        Self::C_MINOR,
        Self::D_MINOR,
        Self::E_MINOR,
        Self::G_MINOR,
    ];

    pub fn all() -> &'static [Chord] {
        &Self::ALL
    }

    pub fn get(name: &str) -> Result<Chord> {
        Self::ALL
            .iter()
            .find(|chord| chord.name.eq_ignore_ascii_case(name))
            .copied()
            .ok_or_else(|| GuitarError::UnknownChord(name.to_string()))
    }
}

/// The four-chord loop played by the strum scheduler.
pub const PROGRESSION: [Chord; 4] = [
    ChordLibrary::C_MAJOR,
    ChordLibrary::G_MAJOR,
    ChordLibrary::A_MINOR,
    ChordLibrary::E_MINOR,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn muted_strings_have_no_fret() {
        let chord = ChordLibrary::D_MAJOR;
        assert_eq!(chord.fret(0), None);
        assert_eq!(chord.fret(1), None);
        assert_eq!(chord.fret(4), Some(3));
        assert_eq!(chord.fret(6), None);
        assert_eq!(chord.sounding_strings(), 4);
    }

    #[test]
    fn looks_up_chords_by_name() {
        assert_eq!(ChordLibrary::get("C_Major").unwrap(), ChordLibrary::C_MAJOR);
        assert_eq!(ChordLibrary::get("e_minor").unwrap().frets, [-1, 2, 3, 0, 0, 0]);
        assert!(matches!(
            ChordLibrary::get("F_Sharp"),
            Err(GuitarError::UnknownChord(_))
        ));
    }

    #[test]
    fn library_has_twelve_unique_names() {
        let mut names: Vec<&str> = ChordLibrary::all().iter().map(|c| c.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 12);
        assert!(ChordLibrary::all()
            .iter()
            .all(|c| c.frets.iter().all(|&f| f >= MUTED)));
    }
}
