use std::collections::BTreeSet;

use anyhow::{Context, Result};
use rusqlite::{params, Row, Transaction};

use crate::db::{
    connection::Database,
    helpers::{invalid_column, parse_datetime, to_i64, to_u64},
};
use crate::models::{Frame, SuccessState, WindowBounds};

pub(crate) const FRAME_COLUMNS: &str = "f.id, f.session_id, f.frame_number, f.timestamp, f.app_name, \
     f.window_title, f.file_path, f.bounds_x, f.bounds_y, f.bounds_width, f.bounds_height, \
     f.screen_width, f.screen_height, f.is_fullscreen, f.ocr_text, f.ai_summary, \
     f.is_success, f.relevance_score, f.tags, f.analyzed";

pub(crate) fn row_to_frame(row: &Row) -> Result<Frame, rusqlite::Error> {
    let timestamp_str: String = row.get("timestamp")?;
    let frame_number: i64 = row.get("frame_number")?;
    let tags_json: String = row.get("tags")?;
    let file_path: String = row.get("file_path")?;

    let bounds = match (
        row.get::<_, Option<f64>>("bounds_x")?,
        row.get::<_, Option<f64>>("bounds_y")?,
        row.get::<_, Option<f64>>("bounds_width")?,
        row.get::<_, Option<f64>>("bounds_height")?,
        row.get::<_, Option<f64>>("screen_width")?,
        row.get::<_, Option<f64>>("screen_height")?,
    ) {
        (Some(x), Some(y), Some(width), Some(height), Some(sw), Some(sh)) => Some(WindowBounds {
            x,
            y,
            width,
            height,
            screen_width: sw,
            screen_height: sh,
            is_fullscreen: row.get("is_fullscreen")?,
        }),
        _ => None,
    };

    let tags: BTreeSet<String> = serde_json::from_str(&tags_json)
        .map_err(|e| invalid_column(anyhow::Error::new(e).context("failed to parse tags")))?;

    Ok(Frame {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        frame_number: to_u64(frame_number, "frame_number").map_err(invalid_column)?,
        timestamp: parse_datetime(&timestamp_str, "timestamp").map_err(invalid_column)?,
        app_name: row.get("app_name")?,
        window_title: row.get("window_title")?,
        file_path: file_path.into(),
        window_bounds: bounds,
        ocr_text: row.get("ocr_text")?,
        ai_summary: row.get("ai_summary")?,
        is_success: SuccessState::from_option(row.get("is_success")?),
        relevance_score: row.get("relevance_score")?,
        tags,
        analyzed: row.get("analyzed")?,
    })
}

fn insert_frame(tx: &Transaction<'_>, frame: &Frame) -> Result<()> {
    let bounds = frame.window_bounds.as_ref();
    tx.execute(
        "INSERT INTO frames (
            id,
            session_id,
            frame_number,
            timestamp,
            app_name,
            window_title,
            file_path,
            bounds_x,
            bounds_y,
            bounds_width,
            bounds_height,
            screen_width,
            screen_height,
            is_fullscreen,
            ocr_text,
            ai_summary,
            is_success,
            relevance_score,
            tags,
            analyzed
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
        params![
            frame.id,
            frame.session_id,
            to_i64(frame.frame_number)?,
            frame.timestamp.to_rfc3339(),
            frame.app_name,
            frame.window_title,
            frame.file_path.to_string_lossy().into_owned(),
            bounds.map(|b| b.x),
            bounds.map(|b| b.y),
            bounds.map(|b| b.width),
            bounds.map(|b| b.height),
            bounds.map(|b| b.screen_width),
            bounds.map(|b| b.screen_height),
            bounds.is_some_and(|b| b.is_fullscreen),
            frame.ocr_text,
            frame.ai_summary,
            frame.is_success.as_option(),
            frame.relevance_score,
            serde_json::to_string(&frame.tags)?,
            frame.analyzed,
        ],
    )
    .with_context(|| format!("failed to insert frame {}", frame.id))?;
    Ok(())
}

impl Database {
    /// Batch insert frames in one transaction.
    pub async fn insert_frames(&self, frames: &[Frame]) -> Result<()> {
        let frames = frames.to_vec();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            for frame in &frames {
                insert_frame(&tx, frame)?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    /// Get all frames for a session ordered by frame number.
    pub async fn get_frames_for_session(&self, session_id: &str) -> Result<Vec<Frame>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {FRAME_COLUMNS} FROM frames f
                 WHERE f.session_id = ?1
                 ORDER BY f.frame_number ASC"
            ))?;

            let frames = stmt
                .query_map(params![session_id], row_to_frame)?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(frames)
        })
        .await
    }
}
