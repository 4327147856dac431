//! Fundamental-frequency estimation and cents arithmetic.
//!
//! Pitch is expressed in **cents relative to A4 (440 Hz)** throughout the
//! crate: `cents = 1200 · log2(hz / 440)`.  A value of `0.0` doubles as
//! "no detected pitch", which is what the estimator returns for silence and
//! for spectra with no peak in the vocal band.
//!
//! | Helper                      | Purpose                                   |
//! |-----------------------------|-------------------------------------------|
//! | [`PitchEstimator`]          | spectrum → cents (peak picking, ~80–1000 Hz) |
//! | [`hz_to_cents`] / [`cents_to_hz`] | unit conversion                     |
//! | [`note_name`]               | nearest equal-tempered note (`"C#5"`)     |
//! | [`TargetPitch`]             | reference pitch from cents / Hz / key     |
//! | [`PitchAccuracy`]           | traffic-light classification for the UI  |

use serde::{Deserialize, Serialize};

/// Reference frequency of A4.
pub const A4_HZ: f64 = 440.0;
/// Nominal lower edge of the searched vocal band.  The first searched bin is
/// the one containing this frequency, whose centre may lie below it.
pub const MIN_VOCAL_HZ: f64 = 80.0;
/// Upper edge of the searched vocal band.
pub const MAX_VOCAL_HZ: f64 = 1_000.0;

/// One pitch estimate in cents relative to A4.  Always finite; `0.0` means
/// no pitch was detected.
pub type PitchSample = f64;

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

/// Frequency in Hz → cents relative to A4.  Non-positive or non-finite
/// input yields `0.0`.
///
/// ```rust
/// use vocal_coach::analysis::hz_to_cents;
///
/// assert_eq!(hz_to_cents(440.0), 0.0);
/// assert!((hz_to_cents(880.0) - 1200.0).abs() < 1e-9);
/// assert_eq!(hz_to_cents(0.0), 0.0);
/// ```
pub fn hz_to_cents(hz: f64) -> PitchSample {
    if hz <= 0.0 || !hz.is_finite() {
        return 0.0;
    }
    let cents = 1200.0 * (hz / A4_HZ).log2();
    if cents.is_finite() {
        cents
    } else {
        0.0
    }
}

/// Cents relative to A4 → frequency in Hz.
pub fn cents_to_hz(cents: f64) -> f64 {
    A4_HZ * 2f64.powf(cents / 1200.0)
}

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Nearest equal-tempered note for `cents`, e.g. `"A4"` or `"C#5"`.
///
/// Returns `None` for non-finite input.
///
/// ```rust
/// use vocal_coach::analysis::note_name;
///
/// assert_eq!(note_name(0.0).as_deref(), Some("A4"));
/// assert_eq!(note_name(-900.0).as_deref(), Some("C4"));
/// assert_eq!(note_name(1_640.0).as_deref(), Some("C#6"));
/// ```
pub fn note_name(cents: f64) -> Option<String> {
    if !cents.is_finite() {
        return None;
    }
    let semitones = (cents / 100.0).round() as i64;
    let midi = 69 + semitones;
    let name = NOTE_NAMES[midi.rem_euclid(12) as usize];
    let octave = midi.div_euclid(12) - 1;
    Some(format!("{name}{octave}"))
}

// ---------------------------------------------------------------------------
// PitchEstimator
// ---------------------------------------------------------------------------

/// Peak-picking fundamental estimator over the vocal band.
///
/// For a spectrum of `N` bins taken from a `2N`-point transform at `sr` Hz,
/// bins `floor(min_hz·2N/sr) ..= floor(max_hz·2N/sr)` (clipped to the
/// spectrum) are searched for the strongest finite magnitude.  The estimate
/// is `bin · sr / 2N` Hz converted to cents.
///
/// The band edges are rounded down to whole bins, so the search is only
/// approximately limited to `min_hz..=max_hz`: with coarse bins the lowest
/// searched bin can sit below `min_hz` (at 22 Hz per bin, bin 3 is 66 Hz).
///
/// Peak picking locks onto whichever harmonic is loudest, so a voice whose
/// second harmonic dominates reads an octave high.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchEstimator {
    min_hz: f64,
    max_hz: f64,
}

impl Default for PitchEstimator {
    fn default() -> Self {
        Self {
            min_hz: MIN_VOCAL_HZ,
            max_hz: MAX_VOCAL_HZ,
        }
    }
}

impl PitchEstimator {
    /// Estimator over the nominal 80–1000 Hz vocal band.
    pub fn new() -> Self {
        Self::default()
    }

    /// Estimate the pitch of one dB spectrum.
    ///
    /// Returns `0.0` for an empty spectrum, a zero sample rate, a band with
    /// no finite values, or a flat band where no bin rises above the band
    /// minimum.  Never allocates.
    pub fn estimate(&self, frequency_db: &[f32], sample_rate: u32) -> PitchSample {
        let bins = frequency_db.len();
        if bins == 0 || sample_rate == 0 {
            return 0.0;
        }

        let sr = sample_rate as f64;
        let fft_size = 2.0 * bins as f64;
        let lo = (self.min_hz * fft_size / sr).floor() as usize;
        let hi = ((self.max_hz * fft_size / sr).floor() as usize).min(bins - 1);
        if lo > hi {
            return 0.0;
        }

        let mut peak: Option<(usize, f32)> = None;
        let mut floor = f32::INFINITY;
        for (i, &db) in frequency_db[lo..=hi].iter().enumerate() {
            if !db.is_finite() {
                continue;
            }
            floor = floor.min(db);
            if peak.map_or(true, |(_, best)| db > best) {
                peak = Some((lo + i, db));
            }
        }

        match peak {
            Some((index, db)) if db > floor => hz_to_cents(index as f64 * sr / fft_size),
            _ => 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// TargetPitch
// ---------------------------------------------------------------------------

/// Reference pitch the singer is aiming for, in cents relative to A4.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetPitch {
    cents: f64,
}

/// Transpose range offered by the karaoke player.
pub const MAX_TRANSPOSE: i32 = 12;

impl TargetPitch {
    /// Target at `cents` relative to A4.  Non-finite input becomes A4.
    pub fn from_cents(cents: f64) -> Self {
        Self {
            cents: if cents.is_finite() { cents } else { 0.0 },
        }
    }

    /// Target at `hz`.  `None` for non-positive or non-finite frequencies.
    pub fn from_hz(hz: f64) -> Option<Self> {
        if hz > 0.0 && hz.is_finite() {
            Some(Self::from_cents(hz_to_cents(hz)))
        } else {
            None
        }
    }

    /// Target for the tonic of `key` in octave 4, shifted by
    /// `transpose_semitones` (clamped to ±12).
    ///
    /// Accepts a natural letter with an optional `#` or `b`, case
    /// insensitive for the letter.  Anything after the accidental (such as
    /// an `m` for minor keys) is ignored.
    ///
    /// ```rust
    /// use vocal_coach::analysis::TargetPitch;
    ///
    /// assert_eq!(TargetPitch::from_key("A", 0).unwrap().cents(), 0.0);
    /// assert_eq!(TargetPitch::from_key("C", 0).unwrap().cents(), -900.0);
    /// assert_eq!(TargetPitch::from_key("Bb", 2).unwrap().cents(), 300.0);
    /// assert_eq!(TargetPitch::from_key("A", 40).unwrap().cents(), 1200.0);
    /// assert!(TargetPitch::from_key("H", 0).is_none());
    /// ```
    pub fn from_key(key: &str, transpose_semitones: i32) -> Option<Self> {
        let mut chars = key.trim().chars();
        let letter = chars.next()?.to_ascii_uppercase();
        let natural: i32 = match letter {
            'C' => -9,
            'D' => -7,
            'E' => -5,
            'F' => -4,
            'G' => -2,
            'A' => 0,
            'B' => 2,
            _ => return None,
        };
        let accidental = match chars.next() {
            Some('#') | Some('♯') => 1,
            Some('b') | Some('♭') => -1,
            _ => 0,
        };
        let transpose = transpose_semitones.clamp(-MAX_TRANSPOSE, MAX_TRANSPOSE);
        Some(Self::from_cents(
            f64::from(natural + accidental + transpose) * 100.0,
        ))
    }

    /// Cents relative to A4.
    pub fn cents(&self) -> f64 {
        self.cents
    }

    /// Target frequency in Hz.
    pub fn hz(&self) -> f64 {
        cents_to_hz(self.cents)
    }
}

// ---------------------------------------------------------------------------
// PitchAccuracy
// ---------------------------------------------------------------------------

/// How close a pitch is to the target, for colour-coding in the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PitchAccuracy {
    /// Within 25 cents.
    Good,
    /// Within 50 cents.
    Close,
    /// 50 cents or more away.
    Off,
    /// No target set.
    NoTarget,
}

impl PitchAccuracy {
    /// Classify `pitch` against an optional `target`.
    pub fn classify(pitch: PitchSample, target: Option<TargetPitch>) -> Self {
        let Some(target) = target else {
            return Self::NoTarget;
        };
        let diff = (pitch - target.cents()).abs();
        if diff < 25.0 {
            Self::Good
        } else if diff < 50.0 {
            Self::Close
        } else {
            Self::Off
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// 2048-point spectrum at 45 056 Hz: exactly 22 Hz per bin.
    const SR: u32 = 45_056;
    const BINS: usize = 1_024;

    fn spectrum_with_peak(peak: usize) -> Vec<f32> {
        let mut db = vec![-60.0_f32; BINS];
        db[peak] = -10.0;
        db
    }

    // ---- estimator ---------------------------------------------------------

    #[test]
    fn peak_at_440_is_zero_cents() {
        let pitch = PitchEstimator::new().estimate(&spectrum_with_peak(20), SR);
        assert!(pitch.abs() < 1e-9);
    }

    #[test]
    fn peak_at_880_is_one_octave() {
        let pitch = PitchEstimator::new().estimate(&spectrum_with_peak(40), SR);
        assert!((pitch - 1200.0).abs() < 1e-9);
    }

    #[test]
    fn peak_below_band_is_ignored() {
        // Bin 2 = 44 Hz, below 80 Hz; the band itself is flat.
        let pitch = PitchEstimator::new().estimate(&spectrum_with_peak(2), SR);
        assert_eq!(pitch, 0.0);
    }

    #[test]
    fn peak_above_band_is_ignored() {
        // Bin 100 = 2200 Hz.
        let pitch = PitchEstimator::new().estimate(&spectrum_with_peak(100), SR);
        assert_eq!(pitch, 0.0);
    }

    #[test]
    fn result_stays_within_vocal_range() {
        let estimator = PitchEstimator::new();
        let lo = hz_to_cents(MIN_VOCAL_HZ) - 400.0;
        let hi = hz_to_cents(MAX_VOCAL_HZ);
        for peak in 0..BINS {
            let pitch = estimator.estimate(&spectrum_with_peak(peak), SR);
            assert!(pitch.is_finite());
            assert!(pitch == 0.0 || (lo..=hi).contains(&pitch), "bin {peak}: {pitch}");
        }
    }

    #[test]
    fn lower_band_edge_rounds_down_to_a_whole_bin() {
        // floor(80·2048/45056) = 3 → 66 Hz, searched although below 80 Hz.
        let pitch = PitchEstimator::new().estimate(&spectrum_with_peak(3), SR);
        assert!((pitch - hz_to_cents(66.0)).abs() < 1e-9);
    }

    #[test]
    fn upper_band_edge_is_inclusive() {
        // floor(1000·2048/45056) = 45 → 990 Hz.
        let pitch = PitchEstimator::new().estimate(&spectrum_with_peak(45), SR);
        assert!((pitch - hz_to_cents(990.0)).abs() < 1e-9);
    }

    #[test]
    fn silence_and_flat_spectra_yield_zero() {
        let estimator = PitchEstimator::new();
        assert_eq!(estimator.estimate(&vec![0.0; BINS], SR), 0.0);
        assert_eq!(estimator.estimate(&vec![-100.0; BINS], SR), 0.0);
        assert_eq!(estimator.estimate(&vec![f32::NEG_INFINITY; BINS], SR), 0.0);
        assert_eq!(estimator.estimate(&[], SR), 0.0);
        assert_eq!(estimator.estimate(&spectrum_with_peak(20), 0), 0.0);
    }

    #[test]
    fn non_finite_bins_are_skipped() {
        let mut db = spectrum_with_peak(30);
        db[20] = f32::NAN;
        db[25] = f32::INFINITY;
        let pitch = PitchEstimator::new().estimate(&db, SR);
        assert!((pitch - hz_to_cents(660.0)).abs() < 1e-9);
    }

    #[test]
    fn tiny_spectrum_clips_band() {
        // 4 bins at 8 kHz: band is bins 0..=1, bin 1 = 1000 Hz.
        let db = [-50.0_f32, -20.0, -80.0, -90.0];
        let pitch = PitchEstimator::new().estimate(&db, 8_000);
        assert!((pitch - hz_to_cents(1_000.0)).abs() < 1e-9);
    }

    // ---- conversions -------------------------------------------------------

    #[test]
    fn cents_round_trip() {
        for hz in [82.41, 261.63, 440.0, 987.77] {
            assert!((cents_to_hz(hz_to_cents(hz)) - hz).abs() < 1e-9);
        }
    }

    #[test]
    fn note_names_across_octaves() {
        assert_eq!(note_name(-2100.0).as_deref(), Some("C3"));
        assert_eq!(note_name(-100.0).as_deref(), Some("G#4"));
        assert_eq!(note_name(1200.0).as_deref(), Some("A5"));
        assert_eq!(note_name(49.0).as_deref(), Some("A4"));
        assert_eq!(note_name(51.0).as_deref(), Some("A#4"));
        assert_eq!(note_name(f64::NAN), None);
    }

    // ---- target ------------------------------------------------------------

    #[test]
    fn target_from_hz() {
        let t = TargetPitch::from_hz(880.0).expect("valid");
        assert!((t.cents() - 1200.0).abs() < 1e-9);
        assert!((t.hz() - 880.0).abs() < 1e-9);
        assert!(TargetPitch::from_hz(0.0).is_none());
        assert!(TargetPitch::from_hz(f64::NAN).is_none());
    }

    #[test]
    fn target_from_key_variants() {
        assert_eq!(TargetPitch::from_key("f#", 0).map(|t| t.cents()), Some(-300.0));
        assert_eq!(TargetPitch::from_key("Am", 0).map(|t| t.cents()), Some(0.0));
        assert_eq!(TargetPitch::from_key("E", -20).map(|t| t.cents()), Some(-1700.0));
        assert!(TargetPitch::from_key("", 0).is_none());
    }

    #[test]
    fn target_from_non_finite_cents_is_a4() {
        assert_eq!(TargetPitch::from_cents(f64::INFINITY).cents(), 0.0);
    }

    // ---- accuracy ----------------------------------------------------------

    #[test]
    fn accuracy_classification() {
        let t = Some(TargetPitch::from_cents(100.0));
        assert_eq!(PitchAccuracy::classify(110.0, t), PitchAccuracy::Good);
        assert_eq!(PitchAccuracy::classify(60.0, t), PitchAccuracy::Close);
        assert_eq!(PitchAccuracy::classify(150.0, t), PitchAccuracy::Off);
        assert_eq!(PitchAccuracy::classify(100.0, None), PitchAccuracy::NoTarget);
    }
}
