//! The two-call finalize sequence run when a session is given up.

use tracing::{debug, warn};

use super::state::{FinalizeReport, FinalizeRequest, SubmissionStatus};
use crate::integrations::{RewardSink, StatisticsSink};

/// Submit earned points (only if any) and then the elapsed seconds.
///
/// The calls are sequential and independent: a failed points submission
/// does not prevent the statistics submission. Failures are captured in
/// the report and never returned as errors.
pub async fn finalize(
    request: &FinalizeRequest,
    rewards: &dyn RewardSink,
    statistics: &dyn StatisticsSink,
) -> FinalizeReport {
    let points = if request.points > 0 {
        match rewards.submit_points(request.points).await {
            Ok(()) => {
                debug!(session = %request.session_id, points = request.points, "points submitted");
                SubmissionStatus::Submitted
            }
            Err(err) => {
                warn!(session = %request.session_id, error = %err, "points submission failed");
                SubmissionStatus::Failed(err)
            }
        }
    } else {
        SubmissionStatus::Skipped
    };

    let session = match statistics
        .submit_focus_session(request.elapsed_seconds, request.occurred_at)
        .await
    {
        Ok(()) => {
            debug!(
                session = %request.session_id,
                elapsed_seconds = request.elapsed_seconds,
                "focus session submitted"
            );
            SubmissionStatus::Submitted
        }
        Err(err) => {
            warn!(session = %request.session_id, error = %err, "focus session submission failed");
            SubmissionStatus::Failed(err)
        }
    };

    FinalizeReport {
        request: request.clone(),
        points,
        session,
    }
}
