use super::*;

#[async_trait]
impl crate::traits::GoalStore for SqliteStateStore {
    async fn create_goal(&self, person_id: i64, text: &str) -> anyhow::Result<i64> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "INSERT INTO goals (person_id, text, completed, created_at) VALUES (?, ?, 0, ?)",
        )
        .bind(person_id)
        .bind(text)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn get_incomplete_goals(&self, person_id: i64) -> anyhow::Result<Vec<Goal>> {
        let rows = sqlx::query(
            "SELECT id, person_id, text, completed, created_at, completed_at FROM goals \
             WHERE person_id = ? AND completed = 0 ORDER BY created_at ASC",
        )
        .bind(person_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::row_to_goal).collect())
    }

    async fn get_goals(&self, person_id: i64) -> anyhow::Result<Vec<Goal>> {
        let rows = sqlx::query(
            "SELECT id, person_id, text, completed, created_at, completed_at FROM goals \
             WHERE person_id = ? ORDER BY created_at ASC",
        )
        .bind(person_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::row_to_goal).collect())
    }

    async fn complete_goal(
        &self,
        goal_id: i64,
        completed_at: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        // The completed = 0 guard makes completion write-once: re-running
        // never moves an existing completion timestamp.
        let result = sqlx::query(
            "UPDATE goals SET completed = 1, completed_at = ? WHERE id = ? AND completed = 0",
        )
        .bind(completed_at.to_rfc3339())
        .bind(goal_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
