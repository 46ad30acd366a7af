use anyhow::{anyhow, Context};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::models::{
    EventResult, EventRow, EventType, MatchMethod, MatchStatus, ReportedIdentity, Student,
};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Replaces the stored roster in one transaction.
pub async fn replace_students(pool: &PgPool, students: &[Student]) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM placement_tracker.students")
        .execute(&mut *tx)
        .await?;

    for (position, student) in students.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO placement_tracker.students
            (student_id, name, email, phone, class_id, admission_year, degree, roster_position)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&student.student_id)
        .bind(&student.name)
        .bind(&student.email)
        .bind(&student.phone)
        .bind(&student.class_id)
        .bind(student.admission_year)
        .bind(&student.degree)
        .bind(position as i32)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("failed to store student {}", student.student_id))?;
    }

    tx.commit().await?;
    Ok(())
}

pub async fn load_students(pool: &PgPool) -> anyhow::Result<Vec<Student>> {
    let rows = sqlx::query(
        r#"
        SELECT student_id, name, email, phone, class_id, admission_year, degree
        FROM placement_tracker.students
        ORDER BY roster_position
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut students = Vec::with_capacity(rows.len());
    for row in rows {
        students.push(Student {
            student_id: row.try_get("student_id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            phone: row.try_get("phone")?,
            class_id: row.try_get("class_id")?,
            admission_year: row.try_get("admission_year")?,
            degree: row.try_get("degree")?,
        });
    }

    Ok(students)
}

/// Inserts a whole batch or nothing and returns the sequence numbers the
/// database assigned, in batch order.
pub async fn insert_events(pool: &PgPool, events: &[EventRow]) -> anyhow::Result<Vec<i64>> {
    let mut tx = pool.begin().await?;
    let mut seqs = Vec::with_capacity(events.len());

    for event in events {
        let row = sqlx::query(
            r#"
            INSERT INTO placement_tracker.event_rows
            (row_id, student_id, class_id,
             reported_student_id, reported_name, reported_email, reported_phone, reported_class,
             company, event_type, result, compensation, event_date,
             match_status, match_method, confidence, fingerprint, ingested_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                    $11, $12, $13, $14, $15, $16, $17, $18)
            RETURNING seq
            "#,
        )
        .bind(event.row_id)
        .bind(&event.student_id)
        .bind(&event.class_id)
        .bind(&event.reported.student_id)
        .bind(&event.reported.name)
        .bind(&event.reported.email)
        .bind(&event.reported.phone)
        .bind(&event.reported.class_id)
        .bind(&event.company)
        .bind(event.event_type.as_str())
        .bind(event.result.as_str())
        .bind(event.compensation)
        .bind(event.event_date)
        .bind(event.match_status.as_str())
        .bind(event.match_method.map(MatchMethod::as_str))
        .bind(event.confidence)
        .bind(&event.fingerprint)
        .bind(event.ingested_at)
        .fetch_one(&mut *tx)
        .await
        .with_context(|| format!("failed to store event row {}", event.row_id))?;
        seqs.push(row.try_get("seq")?);
    }

    tx.commit().await?;
    Ok(seqs)
}

/// Applies a manual binding. Returns false when the row was no longer unmatched.
pub async fn mark_resolved(pool: &PgPool, event: &EventRow) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE placement_tracker.event_rows
        SET student_id = $2, class_id = $3, match_status = $4,
            match_method = $5, confidence = $6
        WHERE row_id = $1 AND match_status = 'UNMATCHED'
        "#,
    )
    .bind(event.row_id)
    .bind(&event.student_id)
    .bind(&event.class_id)
    .bind(event.match_status.as_str())
    .bind(event.match_method.map(MatchMethod::as_str))
    .bind(event.confidence)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn load_events(pool: &PgPool) -> anyhow::Result<Vec<EventRow>> {
    let rows = sqlx::query(
        r#"
        SELECT row_id, seq, student_id, class_id,
               reported_student_id, reported_name, reported_email, reported_phone, reported_class,
               company, event_type, result, compensation, event_date,
               match_status, match_method, confidence, fingerprint, ingested_at
        FROM placement_tracker.event_rows
        ORDER BY seq
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.iter().map(event_from_row).collect()
}

fn event_from_row(row: &PgRow) -> anyhow::Result<EventRow> {
    let status: String = row.try_get("match_status")?;
    let method: Option<String> = row.try_get("match_method")?;
    let event_type: String = row.try_get("event_type")?;
    let result: String = row.try_get("result")?;

    Ok(EventRow {
        row_id: row.try_get("row_id")?,
        seq: row.try_get("seq")?,
        student_id: row.try_get("student_id")?,
        class_id: row.try_get("class_id")?,
        reported: ReportedIdentity {
            student_id: row.try_get("reported_student_id")?,
            name: row.try_get("reported_name")?,
            email: row.try_get("reported_email")?,
            phone: row.try_get("reported_phone")?,
            class_id: row.try_get("reported_class")?,
        },
        company: row.try_get("company")?,
        event_type: EventType::parse(Some(event_type.as_str())),
        result: EventResult::parse(Some(result.as_str())),
        compensation: row.try_get("compensation")?,
        event_date: row.try_get("event_date")?,
        match_status: MatchStatus::from_db(&status)
            .ok_or_else(|| anyhow!("unknown match status {status}"))?,
        match_method: match method {
            Some(raw) => Some(
                MatchMethod::from_db(&raw).ok_or_else(|| anyhow!("unknown match method {raw}"))?,
            ),
            None => None,
        },
        confidence: row.try_get("confidence")?,
        fingerprint: row.try_get("fingerprint")?,
        ingested_at: row.try_get("ingested_at")?,
    })
}
