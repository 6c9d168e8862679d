//! Consistency rules over the collection settings.

use crate::engine::CollectionSettings;
use crate::error::ConsistencyError;

/// Check a settings snapshot for illegal combinations.
///
/// Rules are checked in order and the first violation is returned. Pure:
/// setters call it on a tentative copy and discard the copy on failure.
pub fn check_consistency(s: &CollectionSettings) -> Result<(), ConsistencyError> {
    if s.java_args.is_some() && !s.java_enabled {
        return Err(ConsistencyError::JavaArgsWithoutJava);
    }

    let counting = s.count_mode.is_on();

    if counting
        && ((s.clkprof_enabled && !s.clkprof_default)
            || !s.counters.is_empty()
            || s.synctrace_enabled
            || s.heaptrace_mode.is_some()
            || s.iotrace_enabled)
    {
        return Err(ConsistencyError::CountWithOtherData);
    }

    if counting
        && ((s.java_enabled && !s.java_default)
            || s.java_args.is_some()
            || s.debug
            || (s.follow_mode != crate::models::FollowMode::None && !s.follow_default)
            || s.pause_resume.is_some()
            || s.sample_sig.is_some()
            || (!s.sample_default && s.sample_period != 0)
            || s.time_run != 0)
    {
        return Err(ConsistencyError::CountWithOptions);
    }

    if !counting && (!s.count_instrument_dirs.is_empty() || !s.count_excluded_libs.is_empty()) {
        return Err(ConsistencyError::CountFlagsWithoutCount);
    }

    Ok(())
}
