//! Query Builder pagination

use crate::error::{ModelError, ModelResult};
use crate::model::FromRecord;

use super::builder::QueryBuilder;
use super::types::Paginated;

impl<M: FromRecord> QueryBuilder<M> {
    /// Fetch page `page` (1-indexed) of `per_page` rows.
    ///
    /// Runs an uncapped COUNT over the pending conditions, then the limited
    /// SELECT. `last_page` is `ceil(total / per_page)`, so it is 0 when
    /// nothing matches.
    pub async fn paginate(&mut self, per_page: u64, page: u64) -> ModelResult<Paginated<M>> {
        let mut state = self.take_state()?;
        if per_page == 0 {
            return Err(ModelError::Validation("per_page must be at least 1".to_string()));
        }
        if page == 0 {
            return Err(ModelError::Validation("page numbers start at 1".to_string()));
        }
        let offset = (page - 1)
            .checked_mul(per_page)
            .ok_or_else(|| ModelError::Validation(format!("page {} is out of range", page)))?;

        let total = self.count_where(&state.conditions).await?;

        state.limit = Some(per_page);
        state.offset = Some(offset);
        let records = self.fetch(state).await?;
        let data = records.into_iter().map(M::from_record).collect::<ModelResult<Vec<M>>>()?;

        Ok(Paginated {
            data,
            total,
            per_page,
            current_page: page,
            last_page: total.div_ceil(per_page),
        })
    }
}
