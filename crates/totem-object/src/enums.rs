//! Reflected enumeration metadata.

// ============================================================================
// EnumInfo - Per-enum metadata record
// ============================================================================

/// Metadata for a reflected enumeration: parallel arrays of backing values
/// and enumerator names, plus whether the enumeration is a flag set.
#[derive(Debug)]
pub struct EnumInfo {
    name: &'static str,
    values: Vec<i32>,
    enumerators: Vec<&'static str>,
    is_flags: bool,
}

impl EnumInfo {
    /// Build the metadata record.
    ///
    /// # Panics
    ///
    /// Panics when the value and enumerator arrays differ in length.
    #[must_use]
    pub fn new(
        name: &'static str,
        values: Vec<i32>,
        enumerators: Vec<&'static str>,
        is_flags: bool,
    ) -> Self {
        assert_eq!(
            values.len(),
            enumerators.len(),
            "enum {name} has mismatched value and enumerator arrays"
        );
        Self {
            name,
            values,
            enumerators,
            is_flags,
        }
    }

    /// The enumeration's display name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Backing values, parallel to [`enumerators`](Self::enumerators).
    #[must_use]
    pub fn values(&self) -> &[i32] {
        &self.values
    }

    /// Enumerator names, parallel to [`values`](Self::values).
    #[must_use]
    pub fn enumerators(&self) -> &[&'static str] {
        &self.enumerators
    }

    /// Whether the enumeration was declared as a flag set.
    #[must_use]
    pub const fn is_enum_flags(&self) -> bool {
        self.is_flags
    }

    /// The enumerator name for `value`, if one is declared.
    #[must_use]
    pub fn to_name(&self, value: i32) -> Option<&'static str> {
        self.values
            .iter()
            .position(|&candidate| candidate == value)
            .map(|index| self.enumerators[index])
    }

    /// The backing value for `name`, compared case-insensitively.
    /// Returns -1 when no enumerator matches.
    #[must_use]
    pub fn from_name(&self, name: &str) -> i32 {
        self.enumerators
            .iter()
            .position(|candidate| candidate.eq_ignore_ascii_case(name))
            .map_or(-1, |index| self.values[index])
    }
}

// ============================================================================
// ReflectedEnum - Registration contract
// ============================================================================

/// An enumeration registered with the reflection system.
///
/// Usually derived with `#[derive(ReflectEnum)]`, which also requires the
/// enumeration to be `#[repr(i32)]` so reflected fields can read it through
/// its backing integer.
pub trait ReflectedEnum: Copy + 'static {
    /// The metadata record for this enumeration.
    fn enum_info() -> &'static EnumInfo;
}

/// Stable metadata pointer for a reflected enumeration.
#[must_use]
pub fn static_enum<E: ReflectedEnum>() -> &'static EnumInfo {
    E::enum_info()
}

#[cfg(test)]
mod tests {
    use super::EnumInfo;

    fn sample() -> EnumInfo {
        EnumInfo::new("Fruit", vec![1, 2, 8], vec!["Apple", "Pear", "Quince"], false)
    }

    #[test]
    fn value_to_name_round_trip() {
        let info = sample();
        assert_eq!(info.to_name(2), Some("Pear"));
        assert_eq!(info.to_name(3), None);
        assert_eq!(info.from_name("Quince"), 8);
    }

    #[test]
    fn name_lookup_is_case_insensitive() {
        let info = sample();
        assert_eq!(info.from_name("apple"), 1);
        assert_eq!(info.from_name("PEAR"), 2);
        assert_eq!(info.from_name("plum"), -1);
    }

    #[test]
    #[should_panic(expected = "mismatched value and enumerator arrays")]
    fn mismatched_arrays_are_rejected() {
        let _ = EnumInfo::new("Broken", vec![1], vec![], false);
    }
}
