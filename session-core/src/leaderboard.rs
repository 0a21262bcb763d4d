use std::collections::BTreeSet;

use session_types::{LeaderboardRow, ParticipantId};

use crate::{Roster, SessionTotals};

/// Build the final ranked leaderboard from the session totals.
///
/// Ordering is descending by total points; ties break by roster join order,
/// which is deterministic on every peer. Percentage shares are computed once
/// here by the authority and rendered verbatim by followers so no peer can
/// disagree on rounding. A zero total sum yields all-zero shares.
///
/// A participant who scored and then departed keeps its row; otherwise the
/// shares of the remaining rows would no longer sum to 100. Departed
/// participants with zero points are omitted.
pub fn aggregate(
    totals: &SessionTotals,
    roster: &Roster,
    hosted: &BTreeSet<ParticipantId>,
) -> Vec<LeaderboardRow> {
    let sum = totals.sum();

    let mut rows: Vec<LeaderboardRow> = roster
        .participants()
        .filter(|p| roster.is_connected(p.id) || totals.get(p.id) > 0)
        .map(|participant| {
            let total_points = totals.get(participant.id);
            let percentage_share = if sum == 0 {
                0.0
            } else {
                100.0 * f64::from(total_points) / f64::from(sum)
            };
            LeaderboardRow {
                participant: participant.id,
                display_name: participant.display_name.clone(),
                avatar_index: participant.avatar_index,
                total_points,
                percentage_share,
                hosted: hosted.contains(&participant.id),
            }
        })
        .collect();

    // Rows start in join order; the stable sort keeps that as the tie-break.
    rows.sort_by(|a, b| b.total_points.cmp(&a.total_points));
    rows
}
