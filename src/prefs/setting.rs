use std::{fmt, str::FromStr};

use crate::{
    prefs::{SharedPrefs, MAX_SPEED, MIN_SPEED, SPEED_KEY},
    Error, Result,
};

/// A playback speed accepted by the settings surface.
///
/// This is the only place the speed range is checked. Values already in the
/// store are enforced as they are.
///
/// ```rust
/// use speedlock::prefs::SpeedSetting;
///
/// assert_eq!(SpeedSetting::parse(" 1.25 ")?.value(), 1.25);
/// assert!(SpeedSetting::new(8.01).is_err());
/// # Ok::<(), speedlock::Error>(())
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpeedSetting(f32);

impl SpeedSetting {
    /// Validates `speed` against `[MIN_SPEED, MAX_SPEED]`, both ends inclusive.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SpeedOutOfRange`] for values outside the range or NaN.
    pub fn new(speed: f32) -> Result<Self> {
        if (MIN_SPEED..=MAX_SPEED).contains(&speed) {
            Ok(Self(speed))
        } else {
            Err(Error::SpeedOutOfRange(speed))
        }
    }

    /// Parses user input such as `"2"` or `"0.75"`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSpeed`] if the text is not a number, or
    /// [`Error::SpeedOutOfRange`] if it is out of range.
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        let speed = trimmed
            .parse::<f32>()
            .map_err(|_| Error::InvalidSpeed(trimmed.to_string()))?;
        Self::new(speed)
    }

    /// The validated speed.
    #[must_use]
    pub fn value(self) -> f32 {
        self.0
    }

    /// Stores the speed: removes the old key, writes the new one, commits.
    ///
    /// # Errors
    ///
    /// Returns an error if the preference file cannot be written.
    pub fn save(self, prefs: &SharedPrefs) -> Result<()> {
        prefs
            .edit()
            .remove(SPEED_KEY)
            .put_float(SPEED_KEY, self.0)
            .commit()?;
        log::info!("saved playback speed {}", self.0);
        Ok(())
    }
}

impl FromStr for SpeedSetting {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for SpeedSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x", self.0)
    }
}
