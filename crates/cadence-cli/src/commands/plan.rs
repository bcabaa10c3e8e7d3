//! Plan command handlers
//!
//! Every edit goes through an autosave session that is flushed before the
//! command returns.

use anyhow::{bail, Result};

use cadence_core::{MonthSection, PlanDocument, Session, WeekField};

use crate::output::Output;

/// Show the current plan
pub fn show(session: &Session, output: &Output) -> Result<()> {
    output.print_plan(session.document());
    Ok(())
}

/// Append a month section
pub async fn month_add(
    session: &Session,
    title: String,
    goal: Option<String>,
    output: &Output,
) -> Result<()> {
    let mut number = 0;
    apply_edit(session, output, |doc| {
        let mut month = MonthSection::new(title.clone());
        month.goal = goal.unwrap_or_default();
        number = doc.add_month(month) + 1;
        Ok(())
    })
    .await?;

    output.success(&format!("Added month {}: {}", number, title));
    Ok(())
}

/// Remove a month section by its 1-based number
pub async fn month_remove(session: &Session, number: usize, output: &Output) -> Result<()> {
    let index = month_index(number)?;
    let mut title = String::new();
    apply_edit(session, output, |doc| {
        title = doc.remove_month(index)?.title;
        Ok(())
    })
    .await?;

    output.success(&format!("Removed month {}: {}", number, title));
    Ok(())
}

/// Set one field of one week
pub async fn week_set(
    session: &Session,
    month: usize,
    week: usize,
    field: String,
    value: String,
    output: &Output,
) -> Result<()> {
    let month_idx = month_index(month)?;
    let Some(week_idx) = week.checked_sub(1) else {
        bail!("Weeks are numbered from 1");
    };
    let field: WeekField = field.parse()?;

    apply_edit(session, output, |doc| {
        doc.set_week_field(month_idx, week_idx, field, value)?;
        Ok(())
    })
    .await?;

    output.success(&format!("Updated month {} week {}", month, week));
    Ok(())
}

fn month_index(number: usize) -> Result<usize> {
    match number.checked_sub(1) {
        Some(index) => Ok(index),
        None => bail!("Months are numbered from 1"),
    }
}

/// Apply an edit and flush it through autosave
async fn apply_edit<F>(session: &Session, output: &Output, edit: F) -> Result<()>
where
    F: FnOnce(&mut PlanDocument) -> Result<()>,
{
    let mut doc = session.document().clone();
    edit(&mut doc)?;

    let handle = session.start_autosave();
    handle.edit(doc).await;
    let (status, events) = handle.shutdown().await;

    output.print_save(status, &events);
    Ok(())
}
