use slipstream_core::protocol::RaceOutcome;
use slipstream_core::PlayerID;

#[derive(Clone, Copy, Debug)]
struct FinishRecord {
    id: PlayerID,
    total_time: f64,
}

/// Collects finish reports and seals the final ranking once nobody who
/// is still connected is racing.
///
/// The first report per car wins; later reports for the same car are
/// ignored, as is everything after sealing. A car that finished and
/// then disconnected keeps its place in the ranking.
#[derive(Default)]
pub struct RaceCoordinator {
    finishers: Vec<FinishRecord>,
    outcome: Option<RaceOutcome>,
}

impl RaceCoordinator {
    pub fn new() -> RaceCoordinator {
        Default::default()
    }

    /// Record a finish report; returns false if the car already has one
    /// or the ranking is sealed.
    pub fn record_finish(&mut self, id: PlayerID, total_time: f64) -> bool {
        if self.outcome.is_some() || self.has_finished(id) {
            return false;
        }
        log::info!("player {} reports finishing in {:.3}s", id, total_time);
        self.finishers.push(FinishRecord { id, total_time });
        true
    }

    pub fn has_finished(&self, id: PlayerID) -> bool {
        self.finishers.iter().any(|record| record.id == id)
    }

    pub fn outcome(&self) -> Option<&RaceOutcome> {
        self.outcome.as_ref()
    }

    /// Seal the ranking if at least one car finished and no connected
    /// car is still racing. Returns the outcome only on the call that
    /// seals it, so the caller announces it exactly once.
    ///
    /// Cars rank by reported race time, ties broken by id.
    pub fn try_seal(&mut self, racing_connected: usize) -> Option<&RaceOutcome> {
        if self.outcome.is_some() || self.finishers.is_empty() || racing_connected > 0 {
            return None;
        }

        let mut ranked = self.finishers.clone();
        ranked.sort_by(|a, b| {
            a.total_time
                .partial_cmp(&b.total_time)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });
        let positions: Vec<PlayerID> = ranked.iter().map(|record| record.id).collect();

        log::info!("race over, final order {:?}", positions);
        self.outcome = Some(RaceOutcome {
            winner: positions[0],
            positions,
        });
        self.outcome.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranking_orders_by_reported_race_time() {
        let mut coordinator = RaceCoordinator::new();
        assert!(coordinator.record_finish(1, 100.2));
        assert!(coordinator.record_finish(2, 98.7));
        assert!(coordinator.record_finish(3, 101.0));

        let outcome = coordinator.try_seal(0).cloned().unwrap();
        assert_eq!(outcome.winner, 2);
        assert_eq!(outcome.positions, vec![2, 1, 3]);
    }

    #[test]
    fn ties_break_by_lower_id() {
        let mut coordinator = RaceCoordinator::new();
        coordinator.record_finish(5, 90.0);
        coordinator.record_finish(3, 90.0);

        let outcome = coordinator.try_seal(0).cloned().unwrap();
        assert_eq!(outcome.positions, vec![3, 5]);
    }

    #[test]
    fn first_report_per_car_wins() {
        let mut coordinator = RaceCoordinator::new();
        assert!(coordinator.record_finish(1, 100.0));
        assert!(!coordinator.record_finish(1, 50.0));
        coordinator.record_finish(2, 75.0);

        // if the duplicate 50.0 had overwritten anything, car 1 would lead
        let outcome = coordinator.try_seal(0).cloned().unwrap();
        assert_eq!(outcome.positions, vec![2, 1]);
    }

    #[test]
    fn holds_while_a_connected_car_is_still_racing() {
        let mut coordinator = RaceCoordinator::new();
        coordinator.record_finish(1, 60.0);

        assert!(coordinator.try_seal(2).is_none());
        assert!(coordinator.outcome().is_none());
        assert!(coordinator.try_seal(0).is_some());
    }

    #[test]
    fn never_seals_without_a_finisher() {
        let mut coordinator = RaceCoordinator::new();
        assert!(coordinator.try_seal(0).is_none());
        assert!(coordinator.outcome().is_none());
    }

    #[test]
    fn sealed_ranking_is_immutable() {
        let mut coordinator = RaceCoordinator::new();
        coordinator.record_finish(1, 60.0);
        coordinator.try_seal(0);

        assert!(!coordinator.record_finish(2, 10.0));
        assert!(coordinator.try_seal(0).is_none());
        let outcome = coordinator.outcome().unwrap();
        assert_eq!(outcome.winner, 1);
        assert_eq!(outcome.positions, vec![1]);
    }
}
