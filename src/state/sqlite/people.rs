use super::*;

#[async_trait]
impl crate::traits::PersonStore for SqliteStateStore {
    async fn create_person(&self, person: &Person) -> anyhow::Result<i64> {
        let existing = sqlx::query("SELECT id FROM people WHERE username = ?")
            .bind(&person.username)
            .fetch_optional(&self.pool)
            .await?;
        if existing.is_some() {
            anyhow::bail!("Username '{}' already exists", person.username);
        }

        let result = sqlx::query(
            "INSERT INTO people (username, full_name, family_info, emergency_contact_name, \
             emergency_contact_phone, hobbies, active, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, 1, ?)",
        )
        .bind(&person.username)
        .bind(&person.full_name)
        .bind(&person.family_info)
        .bind(&person.emergency_contact_name)
        .bind(&person.emergency_contact_phone)
        .bind(&person.hobbies)
        .bind(person.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn get_person(&self, id: i64) -> anyhow::Result<Option<Person>> {
        let row = sqlx::query(
            "SELECT id, username, full_name, family_info, emergency_contact_name, \
             emergency_contact_phone, hobbies, active, created_at FROM people WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Self::row_to_person(&r)))
    }

    async fn get_person_by_username(&self, username: &str) -> anyhow::Result<Option<Person>> {
        let row = sqlx::query(
            "SELECT id, username, full_name, family_info, emergency_contact_name, \
             emergency_contact_phone, hobbies, active, created_at FROM people WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Self::row_to_person(&r)))
    }

    async fn find_person_by_name(&self, name: &str) -> anyhow::Result<Option<Person>> {
        let name_lower = name.trim().to_lowercase();
        if name_lower.is_empty() {
            return Ok(None);
        }

        // Exact username or full-name match first.
        let row = sqlx::query(
            "SELECT id, username, full_name, family_info, emergency_contact_name, \
             emergency_contact_phone, hobbies, active, created_at FROM people \
             WHERE LOWER(username) = ? OR LOWER(full_name) = ?",
        )
        .bind(&name_lower)
        .bind(&name_lower)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(r) = row {
            return Ok(Some(Self::row_to_person(&r)));
        }

        // First-name match: "sarah" matches "Sarah Jones".
        let rows = sqlx::query(
            "SELECT id, username, full_name, family_info, emergency_contact_name, \
             emergency_contact_phone, hobbies, active, created_at FROM people",
        )
        .fetch_all(&self.pool)
        .await?;

        for r in &rows {
            let full_name: String = r.get("full_name");
            if full_name
                .split_whitespace()
                .next()
                .is_some_and(|first| first.to_lowercase() == name_lower)
            {
                return Ok(Some(Self::row_to_person(r)));
            }
        }

        Ok(None)
    }

    async fn get_active_people(&self) -> anyhow::Result<Vec<Person>> {
        let rows = sqlx::query(
            "SELECT id, username, full_name, family_info, emergency_contact_name, \
             emergency_contact_phone, hobbies, active, created_at FROM people \
             WHERE active = 1 ORDER BY username ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::row_to_person).collect())
    }

    async fn deactivate_person(&self, id: i64) -> anyhow::Result<()> {
        sqlx::query("UPDATE people SET active = 0 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
