//! Stream profile selection
//!
//! Linear scan over the profiles a sensor advertises. Enumeration order is
//! authoritative: the first exact match wins, there is no secondary ranking.

use contracts::{SdkResult, Sensor, StreamProfile, StreamProfileRequest};
use tracing::{debug, instrument};

/// Find the profile matching `request` exactly
///
/// Only video profiles are considered; motion profiles are skipped.
///
/// # Returns
/// `None` when nothing matched. Callers must abort instead of falling back to
/// some other profile.
///
/// # Errors
/// SDK failure while enumerating profiles.
#[instrument(
    name = "select_profile",
    skip(sensor, request),
    fields(sensor = %sensor.name(), request = %request)
)]
pub fn select_profile(
    sensor: &dyn Sensor,
    request: &StreamProfileRequest,
) -> SdkResult<Option<StreamProfile>> {
    let profiles = sensor.stream_profiles()?;
    let selected = find_profile(&profiles, request);

    debug!(
        advertised = profiles.len(),
        found = selected.is_some(),
        unique_id = selected.map(|p| p.unique_id()),
        "profile scan finished"
    );

    Ok(selected)
}

/// Scan an already enumerated profile list
pub fn find_profile(
    profiles: &[StreamProfile],
    request: &StreamProfileRequest,
) -> Option<StreamProfile> {
    profiles
        .iter()
        .find(|profile| profile.as_video().is_some_and(|video| request.matches(video)))
        .copied()
}
