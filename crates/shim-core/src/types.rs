//! Strong domain types for the wasi-shim runtime.
//!
//! Guest-facing integers are wrapped in newtypes so pollable ids and exit
//! statuses cannot be mixed up with pointers or lengths that travel through
//! the same `i32` parameters.
//!
//! # Examples
//!
//! ```
//! use shim_core::{ExitCode, PollableId};
//!
//! let id = PollableId::from_guest(4);
//! assert_eq!(id.as_u32(), 4);
//!
//! let code = ExitCode::from_i32(42);
//! assert!(!code.is_success());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a pollable (newtype over `u32`).
///
/// Ids are handed out sequentially from 0 and are never reused. The guest
/// sees them as plain `i32` values.
///
/// # Examples
///
/// ```
/// use shim_core::PollableId;
///
/// let id = PollableId::new(2);
/// assert_eq!(id.to_guest(), 2);
/// assert_eq!(id.to_string(), "2");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PollableId(u32);

impl PollableId {
    /// Creates a pollable id from its raw value.
    #[inline]
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Reinterprets an `i32` received from the guest as an id.
    ///
    /// # Examples
    ///
    /// ```
    /// use shim_core::PollableId;
    ///
    /// assert_eq!(PollableId::from_guest(-1).as_u32(), u32::MAX);
    /// ```
    #[inline]
    #[must_use]
    pub const fn from_guest(raw: i32) -> Self {
        Self(raw.cast_unsigned())
    }

    /// Returns the id as the guest sees it.
    #[inline]
    #[must_use]
    pub const fn to_guest(self) -> i32 {
        self.0.cast_signed()
    }

    /// Returns the raw id.
    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns the arena slot this id occupies.
    #[inline]
    #[must_use]
    pub const fn as_index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PollableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for PollableId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Process exit status derived from the guest.
///
/// Either the integer returned by the run entrypoint or the code passed to
/// `proc_exit`.
///
/// # Examples
///
/// ```
/// use shim_core::ExitCode;
///
/// let code = ExitCode::SUCCESS;
/// assert_eq!(code.as_i32(), 0);
/// assert!(code.is_success());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ExitCode(i32);

impl ExitCode {
    /// Successful execution (exit code 0).
    pub const SUCCESS: Self = Self(0);

    /// Host-side failure before or while running the guest (exit code 1).
    pub const ERROR: Self = Self(1);

    /// Invalid input or arguments (exit code 2).
    pub const INVALID_INPUT: Self = Self(2);

    /// Creates an exit code from an integer value.
    ///
    /// # Examples
    ///
    /// ```
    /// use shim_core::ExitCode;
    ///
    /// let code = ExitCode::from_i32(0);
    /// assert_eq!(code, ExitCode::SUCCESS);
    /// ```
    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        Self(code)
    }

    /// Returns the exit code as an integer.
    #[must_use]
    pub const fn as_i32(&self) -> i32 {
        self.0
    }

    /// Checks if the exit code represents success.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.0 == 0
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.0
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pollable_id_guest_round_trip() {
        let id = PollableId::from_guest(17);
        assert_eq!(id.as_u32(), 17);
        assert_eq!(id.as_index(), 17);
        assert_eq!(id.to_guest(), 17);
    }

    #[test]
    fn test_pollable_id_ordering() {
        let mut ids = vec![PollableId::new(5), PollableId::new(1), PollableId::new(3)];
        ids.sort();
        assert_eq!(ids, vec![PollableId::new(1), PollableId::new(3), PollableId::new(5)]);
    }

    #[test]
    fn test_pollable_id_serializes_as_number() {
        let json = serde_json::to_string(&PollableId::new(9)).unwrap();
        assert_eq!(json, "9");
    }

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::default(), ExitCode::SUCCESS);
        assert_eq!(i32::from(ExitCode::from_i32(42)), 42);
        assert!(!ExitCode::ERROR.is_success());
        assert_eq!(ExitCode::from_i32(-3).to_string(), "-3");
    }
}
