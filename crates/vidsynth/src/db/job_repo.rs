//! Job repository: CRUD operations for the `video_jobs` table.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

/// A raw job row. Artifact columns hold JSON text.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRow {
    pub id: String,
    pub topic: String,
    pub style_data: String,
    pub llm_provider: String,
    pub duration_secs: u32,
    pub include_voiceover: bool,
    pub status: String,
    pub progress: u8,
    pub message: Option<String>,
    pub script_data: Option<String>,
    pub blueprint_data: Option<String>,
    pub audio_data: Option<String>,
    pub video_path: Option<String>,
    pub report_url: Option<String>,
    pub error: Option<String>,
    pub warnings: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
    /// RFC 3339 UTC with millisecond precision, so it orders as text.
    pub lease_expires_at: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            topic: row.get("topic")?,
            style_data: row.get("style_data")?,
            llm_provider: row.get("llm_provider")?,
            duration_secs: row.get("duration_secs")?,
            include_voiceover: row.get("include_voiceover")?,
            status: row.get("status")?,
            progress: row.get("progress")?,
            message: row.get("message")?,
            script_data: row.get("script_data")?,
            blueprint_data: row.get("blueprint_data")?,
            audio_data: row.get("audio_data")?,
            video_path: row.get("video_path")?,
            report_url: row.get("report_url")?,
            error: row.get("error")?,
            warnings: row.get("warnings")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            completed_at: row.get("completed_at")?,
            lease_expires_at: row.get("lease_expires_at")?,
        })
    }
}

/// Query filter parameters for job listing.
#[derive(Debug, Default, Clone)]
pub struct JobFilter {
    pub status: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Inserts a new job row.
pub fn insert(db: &Database, job: &JobRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO video_jobs (id, topic, style_data, llm_provider, duration_secs,
             include_voiceover, status, progress, message, script_data, blueprint_data,
             audio_data, video_path, report_url, error, warnings, created_at, updated_at,
             completed_at, lease_expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
             ?17, ?18, ?19, ?20)",
            params![
                job.id,
                job.topic,
                job.style_data,
                job.llm_provider,
                job.duration_secs,
                job.include_voiceover,
                job.status,
                job.progress,
                job.message,
                job.script_data,
                job.blueprint_data,
                job.audio_data,
                job.video_path,
                job.report_url,
                job.error,
                job.warnings,
                job.created_at,
                job.updated_at,
                job.completed_at,
                job.lease_expires_at,
            ],
        )?;
        Ok(())
    })
}

/// Updates the mutable columns of a job that is still PENDING or PROCESSING.
///
/// Returns the number of rows changed: zero when the job is missing or
/// already terminal, even if another connection finished it.
pub fn update(db: &Database, job: &JobRow) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE video_jobs SET status=?2, progress=?3, message=?4, script_data=?5,
             blueprint_data=?6, audio_data=?7, video_path=?8, report_url=?9, error=?10,
             warnings=?11, updated_at=?12, completed_at=?13, lease_expires_at=?14
             WHERE id=?1 AND status IN ('PENDING', 'PROCESSING')",
            params![
                job.id,
                job.status,
                job.progress,
                job.message,
                job.script_data,
                job.blueprint_data,
                job.audio_data,
                job.video_path,
                job.report_url,
                job.error,
                job.warnings,
                job.updated_at,
                job.completed_at,
                job.lease_expires_at,
            ],
        )?;
        Ok(changed)
    })
}

/// Finds a job by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM video_jobs WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], JobRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Queries jobs newest first, returning (rows, total_count).
pub fn query(db: &Database, filter: &JobFilter) -> Result<(Vec<JobRow>, u64), DatabaseError> {
    db.with_conn(|conn| {
        let (where_clause, status) = match filter.status {
            Some(ref status) => ("WHERE status = ?1", Some(status.clone())),
            None => ("", None),
        };

        let count_sql = format!("SELECT COUNT(*) FROM video_jobs {}", where_clause);
        let total: u64 = match status {
            Some(ref s) => conn.query_row(&count_sql, params![s], |r| r.get(0))?,
            None => conn.query_row(&count_sql, [], |r| r.get(0))?,
        };

        let limit = filter.limit.unwrap_or(100) as i64;
        let offset = filter.offset.unwrap_or(0) as i64;
        let mut stmt = conn.prepare(&format!(
            "SELECT * FROM video_jobs {} ORDER BY created_at DESC, id DESC LIMIT ?{} OFFSET ?{}",
            where_clause,
            if status.is_some() { 2 } else { 1 },
            if status.is_some() { 3 } else { 2 },
        ))?;
        let rows = match status {
            Some(ref s) => stmt
                .query_map(params![s, limit, offset], JobRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?,
            None => stmt
                .query_map(params![limit, offset], JobRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?,
        };

        Ok((rows, total))
    })
}

/// Extends the lease of a non-terminal job. Returns whether a row changed.
pub fn renew_lease(db: &Database, id: &str, expires_at: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE video_jobs SET lease_expires_at=?2
             WHERE id=?1 AND status IN ('PENDING', 'PROCESSING')",
            params![id, expires_at],
        )?;
        Ok(changed > 0)
    })
}

/// Returns non-terminal jobs whose lease is missing or older than `now`.
pub fn list_expired(db: &Database, now: &str) -> Result<Vec<JobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM video_jobs
             WHERE status IN ('PENDING', 'PROCESSING')
               AND (lease_expires_at IS NULL OR lease_expires_at < ?1)
             ORDER BY created_at",
        )?;
        let rows = stmt
            .query_map(params![now], JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Counts jobs with the given status.
pub fn count_by_status(db: &Database, status: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM video_jobs WHERE status = ?1",
            params![status],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn sample_job(id: &str) -> JobRow {
        JobRow {
            id: id.to_string(),
            topic: "Photosynthesis".to_string(),
            style_data: r#"{"style":"2D explainer","colors":["green"]}"#.to_string(),
            llm_provider: "mistral".to_string(),
            duration_secs: 120,
            include_voiceover: true,
            status: "PENDING".to_string(),
            progress: 0,
            message: Some("Job queued".to_string()),
            script_data: None,
            blueprint_data: None,
            audio_data: None,
            video_path: None,
            report_url: None,
            error: None,
            warnings: None,
            created_at: "2026-01-01T00:00:00+00:00".to_string(),
            updated_at: "2026-01-01T00:00:00+00:00".to_string(),
            completed_at: None,
            lease_expires_at: None,
        }
    }

    #[test]
    fn test_insert_and_find() {
        let db = test_db();
        insert(&db, &sample_job("job-1")).unwrap();

        let found = find_by_id(&db, "job-1").unwrap().unwrap();
        assert_eq!(found, sample_job("job-1"));
    }

    #[test]
    fn test_find_nonexistent() {
        let db = test_db();
        assert!(find_by_id(&db, "nonexistent").unwrap().is_none());
    }

    #[test]
    fn test_insert_duplicate_fails() {
        let db = test_db();
        insert(&db, &sample_job("dup")).unwrap();
        assert!(insert(&db, &sample_job("dup")).is_err());
    }

    #[test]
    fn test_update() {
        let db = test_db();
        let mut job = sample_job("job-2");
        insert(&db, &job).unwrap();

        job.status = "COMPLETED".to_string();
        job.progress = 100;
        job.video_path = Some("/videos/video_job-2.mp4".to_string());
        job.script_data = Some(r#"{"scenes":[]}"#.to_string());
        job.completed_at = Some("2026-01-01T01:00:00+00:00".to_string());
        assert_eq!(update(&db, &job).unwrap(), 1);

        let found = find_by_id(&db, "job-2").unwrap().unwrap();
        assert_eq!(found.status, "COMPLETED");
        assert_eq!(found.progress, 100);
        assert_eq!(found.video_path.as_deref(), Some("/videos/video_job-2.mp4"));
        assert!(found.completed_at.is_some());
    }

    #[test]
    fn test_update_missing_row_changes_nothing() {
        let db = test_db();
        assert_eq!(update(&db, &sample_job("ghost")).unwrap(), 0);
    }

    #[test]
    fn test_query_with_status_filter() {
        let db = test_db();
        insert(&db, &sample_job("s1")).unwrap();

        let mut completed = sample_job("s2");
        completed.status = "COMPLETED".to_string();
        insert(&db, &completed).unwrap();

        let (rows, total) = query(
            &db,
            &JobFilter {
                status: Some("COMPLETED".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].id, "s2");
    }

    #[test]
    fn test_query_orders_newest_first_with_pagination() {
        let db = test_db();
        for i in 0..10 {
            let mut job = sample_job(&format!("p{}", i));
            job.created_at = format!("2026-01-{:02}T00:00:00+00:00", i + 1);
            insert(&db, &job).unwrap();
        }

        let (rows, total) = query(
            &db,
            &JobFilter {
                limit: Some(3),
                offset: Some(1),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(total, 10);
        let ids: Vec<_> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["p8", "p7", "p6"]);
    }

    #[test]
    fn test_update_skips_terminal_row() {
        let db = test_db();
        let mut job = sample_job("done");
        job.status = "FAILED".to_string();
        insert(&db, &job).unwrap();

        job.status = "COMPLETED".to_string();
        assert_eq!(update(&db, &job).unwrap(), 0);
        assert_eq!(find_by_id(&db, "done").unwrap().unwrap().status, "FAILED");
    }

    #[test]
    fn test_list_expired_and_counts() {
        let db = test_db();
        insert(&db, &sample_job("unleased")).unwrap();

        let mut stale = sample_job("stale");
        stale.status = "PROCESSING".to_string();
        stale.lease_expires_at = Some("2026-01-01T00:00:00.000Z".to_string());
        insert(&db, &stale).unwrap();

        let mut live = sample_job("live");
        live.status = "PROCESSING".to_string();
        live.lease_expires_at = Some("2026-01-01T00:05:00.000Z".to_string());
        insert(&db, &live).unwrap();

        let mut failed = sample_job("failed");
        failed.status = "FAILED".to_string();
        insert(&db, &failed).unwrap();

        let rows = list_expired(&db, "2026-01-01T00:01:00.000Z").unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"unleased") && ids.contains(&"stale"));

        assert!(renew_lease(&db, "stale", "2026-01-01T00:10:00.000Z").unwrap());
        assert!(!renew_lease(&db, "failed", "2026-01-01T00:10:00.000Z").unwrap());
        assert_eq!(list_expired(&db, "2026-01-01T00:01:00.000Z").unwrap().len(), 1);

        assert_eq!(count_by_status(&db, "PENDING").unwrap(), 1);
        assert_eq!(count_by_status(&db, "PROCESSING").unwrap(), 2);
        assert_eq!(count_by_status(&db, "COMPLETED").unwrap(), 0);
    }
}
