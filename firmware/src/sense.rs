//! Conversion of raw ADC samples to sense-line millivolts.

/// VREFINT calibration is taken with VDDA at this level.
pub const VREFINT_CAL_MV: u32 = 3_000;
pub const ADC_FULL_SCALE: u32 = 4_095;

/// Ratio of the external divider in front of each sense input.
pub const SENSE_DIVIDER: u32 = 2;

/// Supply range the ADC is specified for; readings outside it are noise.
pub const VDDA_MIN_MV: u32 = 1_620;
pub const VDDA_MAX_MV: u32 = 3_600;

/// Analog supply derived from a VREFINT conversion and its factory
/// calibration word, clamped to the specified VDDA range.
#[must_use]
pub fn vdda_from_vrefint(reading: u16, calibration: u16) -> u32 {
    if reading == 0 || calibration == 0 {
        return VREFINT_CAL_MV;
    }
    let vdda = VREFINT_CAL_MV * u32::from(calibration) / u32::from(reading);
    vdda.clamp(VDDA_MIN_MV, VDDA_MAX_MV)
}

/// Converts a raw `reading` to millivolts at the input of a sense divider.
#[must_use]
pub fn raw_to_millivolts(reading: u16, vdda_mv: u32) -> u32 {
    let millivolts = u64::from(reading) * u64::from(vdda_mv) * u64::from(SENSE_DIVIDER)
        / u64::from(ADC_FULL_SCALE);
    u32::try_from(millivolts).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_scale_reads_twice_the_supply() {
        assert_eq!(raw_to_millivolts(4_095, 3_300), 6_600);
        assert_eq!(raw_to_millivolts(0, 3_300), 0);
        assert_eq!(raw_to_millivolts(2_048, 3_000), 3_000);
    }

    #[test]
    fn conversion_saturates_instead_of_wrapping() {
        assert_eq!(
            raw_to_millivolts(u16::MAX, u32::MAX),
            u32::MAX,
            "product exceeds u32"
        );
        assert_eq!(raw_to_millivolts(u16::MAX, VDDA_MAX_MV), 115_226);
    }

    #[test]
    fn vdda_follows_the_vrefint_ratio() {
        assert_eq!(vdda_from_vrefint(1_500, 1_650), 3_300);
        assert_eq!(vdda_from_vrefint(1_650, 1_650), VREFINT_CAL_MV);
    }

    #[test]
    fn vdda_is_clamped_to_the_supply_range() {
        assert_eq!(vdda_from_vrefint(1, 1_650), VDDA_MAX_MV);
        assert_eq!(vdda_from_vrefint(4_095, 1_650), VDDA_MIN_MV);
        assert_eq!(vdda_from_vrefint(0, 1_650), VREFINT_CAL_MV);
        assert_eq!(vdda_from_vrefint(1_650, 0), VREFINT_CAL_MV);
    }
}
