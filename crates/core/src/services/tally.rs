//! Tally service.

use std::collections::HashMap;

use pollhub_common::AppResult;
use pollhub_db::repositories::VoteRepository;

use crate::tally::Tally;

/// Computes tallies from the vote ledger.
#[derive(Clone)]
pub struct TallyService {
    vote_repo: VoteRepository,
}

impl TallyService {
    #[must_use]
    pub const fn new(vote_repo: VoteRepository) -> Self {
        Self { vote_repo }
    }

    /// Tally one poll with a single grouped query.
    pub async fn compute(&self, poll_id: &str) -> AppResult<Tally> {
        let rows = self.vote_repo.count_by_option(poll_id).await?;
        Ok(Tally::from_rows(
            rows.into_iter().map(|r| (r.option_selected, r.vote_count)),
        ))
    }

    /// Tally several polls with a single grouped query.
    ///
    /// Every requested poll gets an entry, zero if it has no votes.
    pub async fn compute_many(&self, poll_ids: &[String]) -> AppResult<HashMap<String, Tally>> {
        let mut tallies: HashMap<String, Tally> = poll_ids
            .iter()
            .map(|id| (id.clone(), Tally::default()))
            .collect();

        let mut rows: HashMap<String, Vec<(i32, i64)>> = HashMap::new();
        for row in self.vote_repo.count_by_option_many(poll_ids).await? {
            rows.entry(row.poll_id)
                .or_default()
                .push((row.option_selected, row.vote_count));
        }
        for (poll_id, counts) in rows {
            tallies.insert(poll_id, Tally::from_rows(counts));
        }

        Ok(tallies)
    }
}
