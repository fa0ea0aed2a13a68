use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, Row};

use super::frames::{row_to_frame, FRAME_COLUMNS};
use crate::db::{
    connection::Database,
    helpers::{invalid_column, parse_datetime, parse_success_state, to_i64},
};
use crate::models::{Frame, TaskCluster};

/// Cluster row without its frames.
fn row_to_cluster(row: &Row) -> Result<TaskCluster, rusqlite::Error> {
    let start_str: String = row.get("start_time")?;
    let end_str: String = row.get("end_time")?;
    let success_str: String = row.get("success_state")?;

    Ok(TaskCluster {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        frames: Vec::new(),
        start_time: parse_datetime(&start_str, "start_time").map_err(invalid_column)?,
        end_time: parse_datetime(&end_str, "end_time").map_err(invalid_column)?,
        is_coherent: row.get("is_coherent")?,
        name: row.get("name")?,
        description: row.get("description")?,
        success_state: parse_success_state(&success_str).map_err(invalid_column)?,
        relevance: row.get("relevance")?,
    })
}

fn frames_for_cluster(conn: &Connection, cluster_id: &str) -> Result<Vec<Frame>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {FRAME_COLUMNS} FROM task_cluster_frames tcf
         JOIN frames f ON f.id = tcf.frame_id
         WHERE tcf.cluster_id = ?1
         ORDER BY tcf.position ASC"
    ))?;
    let frames = stmt
        .query_map(params![cluster_id], row_to_frame)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(frames)
}

impl Database {
    /// Saves clusters and their frame membership. The frames must already
    /// be stored.
    pub async fn insert_task_clusters(&self, clusters: &[TaskCluster]) -> Result<()> {
        let clusters = clusters.to_vec();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let created_at = Utc::now().to_rfc3339();

            for cluster in &clusters {
                tx.execute(
                    "INSERT INTO task_clusters (
                        id,
                        session_id,
                        start_time,
                        end_time,
                        is_coherent,
                        name,
                        description,
                        success_state,
                        relevance,
                        created_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        cluster.id,
                        cluster.session_id,
                        cluster.start_time.to_rfc3339(),
                        cluster.end_time.to_rfc3339(),
                        cluster.is_coherent,
                        cluster.name,
                        cluster.description,
                        cluster.success_state.as_str(),
                        cluster.relevance,
                        created_at,
                    ],
                )
                .with_context(|| format!("failed to insert task cluster {}", cluster.id))?;

                for (position, frame) in cluster.frames.iter().enumerate() {
                    tx.execute(
                        "INSERT INTO task_cluster_frames (cluster_id, frame_id, position)
                         VALUES (?1, ?2, ?3)",
                        params![cluster.id, frame.id, to_i64(position as u64)?],
                    )
                    .with_context(|| {
                        format!("failed to link frame {} to cluster {}", frame.id, cluster.id)
                    })?;
                }
            }

            tx.commit()?;
            Ok(())
        })
        .await
    }

    /// Get a session's saved clusters, oldest first, with their frames.
    pub async fn get_task_clusters_for_session(&self, session_id: &str) -> Result<Vec<TaskCluster>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let mut clusters = {
                let mut stmt = conn.prepare(
                    "SELECT id, session_id, start_time, end_time, is_coherent, name,
                            description, success_state, relevance
                     FROM task_clusters
                     WHERE session_id = ?1
                     ORDER BY start_time ASC",
                )?;
                let rows = stmt
                    .query_map(params![session_id], row_to_cluster)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            };

            for cluster in &mut clusters {
                cluster.frames = frames_for_cluster(conn, &cluster.id)?;
            }

            Ok(clusters)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SuccessState;
    use chrono::{Duration, TimeZone};

    #[tokio::test]
    async fn clusters_round_trip_with_their_frames() {
        let db = Database::open_in_memory().unwrap();
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let frames: Vec<Frame> = (0..3)
            .map(|i| Frame::new("s", i, base + Duration::seconds(i as i64 * 10), "Terminal"))
            .collect();
        db.insert_frames(&frames).await.unwrap();

        let cluster = TaskCluster {
            id: "cluster-1".into(),
            session_id: "s".into(),
            frames: vec![frames[2].clone(), frames[0].clone()],
            start_time: frames[0].timestamp,
            end_time: frames[2].timestamp,
            is_coherent: true,
            name: "Fix flaky test".into(),
            description: "Reran the suite until green".into(),
            success_state: SuccessState::Success,
            relevance: 0.85,
        };
        db.insert_task_clusters(&[cluster]).await.unwrap();

        let loaded = db.get_task_clusters_for_session("s").await.unwrap();
        assert_eq!(loaded.len(), 1);
        let loaded = &loaded[0];
        assert_eq!(loaded.name, "Fix flaky test");
        assert_eq!(loaded.success_state, SuccessState::Success);
        assert!(loaded.is_coherent);
        assert_eq!(loaded.frame_ids(), vec![frames[2].id.clone(), frames[0].id.clone()]);
    }

    #[tokio::test]
    async fn cluster_referencing_unknown_frame_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        let orphan = Frame::new("s", 1, Utc::now(), "Terminal");
        let cluster = TaskCluster {
            id: "c".into(),
            session_id: "s".into(),
            start_time: orphan.timestamp,
            end_time: orphan.timestamp,
            frames: vec![orphan],
            is_coherent: false,
            name: String::new(),
            description: String::new(),
            success_state: SuccessState::Unknown,
            relevance: 0.5,
        };
        assert!(db.insert_task_clusters(&[cluster]).await.is_err());
        assert!(db.get_task_clusters_for_session("s").await.unwrap().is_empty());
    }
}
