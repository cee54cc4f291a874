//! Transcoding profile operations. Profiles are stored as JSON documents.

use chrono::Utc;
use rh_core::{Error, ProfileId, Result, TranscodingProfile};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::fmt_ts;

fn decode(data: &str) -> Result<TranscodingProfile> {
    serde_json::from_str(data).map_err(|e| Error::database(format!("corrupt profile row: {e}")))
}

/// Insert a profile, or replace the stored document for an existing ID.
pub fn put_profile(conn: &Connection, profile: &TranscodingProfile) -> Result<()> {
    let data = serde_json::to_string(profile)
        .map_err(|e| Error::Internal(format!("serialize profile: {e}")))?;
    conn.execute(
        "INSERT INTO transcoding_profiles (id, data, created_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(id) DO UPDATE SET data = excluded.data",
        params![profile.id.as_str(), data, fmt_ts(&Utc::now())],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    Ok(())
}

pub fn get_profile(conn: &Connection, id: &ProfileId) -> Result<Option<TranscodingProfile>> {
    let data: Option<String> = conn
        .query_row(
            "SELECT data FROM transcoding_profiles WHERE id = ?1",
            [id.as_str()],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| Error::database(e.to_string()))?;
    data.as_deref().map(decode).transpose()
}

pub fn list_profiles(conn: &Connection) -> Result<Vec<TranscodingProfile>> {
    let mut stmt = conn
        .prepare("SELECT data FROM transcoding_profiles ORDER BY id")
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(|e| Error::database(e.to_string()))?;
    let mut out = Vec::new();
    for data in rows {
        let data = data.map_err(|e| Error::database(e.to_string()))?;
        out.push(decode(&data)?);
    }
    Ok(out)
}

pub fn delete_profile(conn: &Connection, id: &ProfileId) -> Result<bool> {
    let n = conn
        .execute("DELETE FROM transcoding_profiles WHERE id = ?1", [id.as_str()])
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}
