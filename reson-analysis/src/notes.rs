//! Equal-temperament note table and nearest-note lookup

/// Reference frequency for A4 (440 Hz)
const A4_FREQ: f32 = 440.0;

/// Frequency of the lowest table entry, A0
const A0_FREQ: f32 = A4_FREQ / 16.0;

/// Chromatic note names, starting from C
const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// A single named pitch with its reference frequency
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    /// Note name with octave, e.g. "A4"
    pub name: String,
    /// Reference frequency in Hz
    pub frequency: f32,
}

/// Lookup table over the 88 piano keys, A0 (27.5 Hz) through C8 (~4186 Hz)
///
/// Nearest-note queries compare log-frequency distance, so the match is the
/// note with the smallest deviation in semitones rather than in raw Hz.
pub struct NoteTable {
    notes: Vec<Note>,
}

impl NoteTable {
    /// Build the standard 88-key table
    pub fn new() -> Self {
        let notes = (0..88)
            .map(|i| {
                // i semitones above A0; A sits 9 chromatic steps above C
                let chromatic = (i + 9) % 12;
                let octave = (i + 9) / 12;
                Note {
                    name: format!("{}{}", NOTE_NAMES[chromatic], octave),
                    frequency: A0_FREQ * 2.0f32.powf(i as f32 / 12.0),
                }
            })
            .collect();
        Self { notes }
    }

    /// All table entries in ascending frequency order
    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    /// The note closest to `frequency` in log-frequency distance.
    ///
    /// Frequencies outside the table range (including non-positive values)
    /// clamp to the nearest end of the table.
    pub fn nearest(&self, frequency: f32) -> &Note {
        if frequency <= 0.0 {
            return &self.notes[0];
        }
        let semitones = 12.0 * (frequency / A0_FREQ).log2();
        let index = (semitones.round() as isize).clamp(0, self.notes.len() as isize - 1);
        &self.notes[index as usize]
    }
}

impl Default for NoteTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Signed semitone distance from `from_hz` to `to_hz`.
///
/// This is the correction a caller applies to retune a detected pitch onto a
/// target note: `shift(waveform, semitone_offset(detected, target))`.
pub fn semitone_offset(from_hz: f32, to_hz: f32) -> f32 {
    12.0 * (to_hz / from_hz).log2()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_reference_points() {
        let table = NoteTable::new();
        assert_eq!(table.notes().len(), 88);

        let first = &table.notes()[0];
        assert_eq!(first.name, "A0");
        assert!((first.frequency - 27.5).abs() < 0.01);

        let last = &table.notes()[87];
        assert_eq!(last.name, "C8");
        assert!((last.frequency - 4186.0).abs() < 0.1);
    }

    #[test]
    fn test_nearest_exact_and_detuned() {
        let table = NoteTable::new();

        assert_eq!(table.nearest(440.0).name, "A4");
        // A quarter tone flat of A4 still rounds to A4
        assert_eq!(table.nearest(434.0).name, "A4");
        assert_eq!(table.nearest(466.0).name, "A#4");
        assert_eq!(table.nearest(261.6).name, "C4");
    }

    #[test]
    fn test_nearest_clamps_out_of_range() {
        let table = NoteTable::new();

        assert_eq!(table.nearest(5.0).name, "A0");
        assert_eq!(table.nearest(20000.0).name, "C8");
        assert_eq!(table.nearest(0.0).name, "A0");
        assert_eq!(table.nearest(-10.0).name, "A0");
    }

    #[test]
    fn test_semitone_offset() {
        assert!((semitone_offset(440.0, 880.0) - 12.0).abs() < 1e-4);
        assert!((semitone_offset(880.0, 440.0) + 12.0).abs() < 1e-4);
        assert!(semitone_offset(440.0, 440.0).abs() < 1e-6);
        // A4 up to A#4 is one semitone
        let a_sharp = 440.0 * 2.0f32.powf(1.0 / 12.0);
        assert!((semitone_offset(440.0, a_sharp) - 1.0).abs() < 1e-3);
    }
}
