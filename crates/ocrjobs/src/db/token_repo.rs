//! Storage for the `recognition_tokens` table.

use rusqlite::{params, Connection, Row};

use super::DatabaseError;
use crate::jobs::RecognitionToken;

fn token_from_row(row: &Row<'_>) -> Result<RecognitionToken, rusqlite::Error> {
    Ok(RecognitionToken {
        level: row.get("level")?,
        page_number: row.get("page_number")?,
        block_num: row.get("block_num")?,
        par_num: row.get("par_num")?,
        line_num: row.get("line_num")?,
        word_num: row.get("word_num")?,
        left: row.get("left")?,
        top: row.get("top")?,
        width: row.get("width")?,
        height: row.get("height")?,
        confidence: row.get("confidence")?,
        text: row.get("text")?,
    })
}

/// Inserts all tokens for a job with one prepared statement.
///
/// Must run inside the caller's transaction so the batch becomes visible
/// together with the job's status change.
pub fn insert_batch(
    conn: &Connection,
    job_id: &str,
    tokens: &[RecognitionToken],
) -> Result<usize, DatabaseError> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO recognition_tokens (job_id, level, page_number, block_num, par_num,
         line_num, word_num, left, top, width, height, confidence, text)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
    )?;

    for token in tokens {
        stmt.execute(params![
            job_id,
            token.level,
            token.page_number,
            token.block_num,
            token.par_num,
            token.line_num,
            token.word_num,
            token.left,
            token.top,
            token.width,
            token.height,
            token.confidence,
            token.text,
        ])?;
    }

    Ok(tokens.len())
}

/// All tokens of a job in page order, then engine output order.
pub fn find_by_job(conn: &Connection, job_id: &str) -> Result<Vec<RecognitionToken>, DatabaseError> {
    let mut stmt = conn.prepare_cached(
        "SELECT * FROM recognition_tokens WHERE job_id = ?1 ORDER BY page_number, id",
    )?;
    let tokens = stmt
        .query_map(params![job_id], token_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tokens)
}

pub fn count_by_job(conn: &Connection, job_id: &str) -> Result<u64, DatabaseError> {
    let count: u64 = conn.query_row(
        "SELECT COUNT(*) FROM recognition_tokens WHERE job_id = ?1",
        params![job_id],
        |r| r.get(0),
    )?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn token(page: u32, word: i32, text: &str) -> RecognitionToken {
        RecognitionToken {
            level: 5,
            page_number: page,
            block_num: 1,
            par_num: 1,
            line_num: 1,
            word_num: word,
            left: 10 * word,
            top: 20,
            width: 40,
            height: 12,
            confidence: 91.5,
            text: text.to_string(),
        }
    }

    fn insert_job(conn: &Connection, id: &str) {
        conn.execute(
            "INSERT INTO jobs (id, file_name, status, start_time, recognition_params)
             VALUES (?1, 'doc.pdf', 'processing', '2026-01-01T00:00:00Z', '{}')",
            params![id],
        )
        .unwrap();
    }

    #[test]
    fn test_insert_batch_and_find() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            insert_job(conn, "j1");
            let tokens = vec![token(2, 1, "second"), token(1, 1, "hello"), token(1, 2, "")];
            assert_eq!(insert_batch(conn, "j1", &tokens)?, 3);

            let found = find_by_job(conn, "j1")?;
            assert_eq!(found.len(), 3);
            assert_eq!(found[0].text, "hello");
            assert_eq!(found[1].text, "");
            assert_eq!(found[2].page_number, 2);
            assert_eq!(count_by_job(conn, "j1")?, 3);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_tokens_are_scoped_to_job() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            insert_job(conn, "a");
            insert_job(conn, "b");
            insert_batch(conn, "a", &[token(1, 1, "only-a")])?;

            assert!(find_by_job(conn, "b")?.is_empty());
            assert_eq!(count_by_job(conn, "a")?, 1);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_negative_confidence_survives() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            insert_job(conn, "n");
            let mut structural = token(1, 0, "");
            structural.level = 1;
            structural.confidence = -1.0;
            insert_batch(conn, "n", &[structural])?;

            let found = find_by_job(conn, "n")?;
            assert_eq!(found[0].confidence, -1.0);
            assert_eq!(found[0].level, 1);
            Ok(())
        })
        .unwrap();
    }
}
