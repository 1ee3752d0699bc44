//! A small hand-rolled column formatter for `list`/`dlq list`/`status`
//! output (spec §6: "out of core scope, specified only at its interface").
//! No table-drawing crate is pulled in since none of the corpus reaches
//! for one for this purpose.

use queuectl_core::Job;
use std::collections::BTreeMap;

pub fn render_jobs(jobs: &[Job]) -> String {
    if jobs.is_empty() {
        return "(no jobs)\n".to_string();
    }

    let headers = ["ID", "STATE", "ATTEMPTS", "PRIORITY", "UPDATED_AT"];
    let rows: Vec<[String; 5]> = jobs
        .iter()
        .map(|j| {
            [
                j.id.clone(),
                j.state.to_string(),
                format!("{}/{}", j.attempts, j.max_retries),
                j.priority.to_string(),
                j.updated_at.to_rfc3339(),
            ]
        })
        .collect();

    let mut widths = headers.map(str::len);
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row.iter()) {
            *w = (*w).max(cell.len());
        }
    }

    let mut out = String::new();
    push_row(&mut out, &headers.map(str::to_string), &widths);
    for row in &rows {
        push_row(&mut out, row, &widths);
    }
    out
}

fn push_row(out: &mut String, cells: &[String; 5], widths: &[usize; 5]) {
    for (i, (cell, width)) in cells.iter().zip(widths.iter().copied()).enumerate() {
        if i > 0 {
            out.push_str("  ");
        }
        out.push_str(&format!("{cell:<width$}"));
    }
    out.push('\n');
}

pub fn render_counts(counts: &BTreeMap<String, i64>) -> String {
    let mut out = String::new();
    for state in ["pending", "processing", "completed", "failed", "dead"] {
        let n = counts.get(state).copied().unwrap_or(0);
        out.push_str(&format!("{state:<12}{n}\n"));
    }
    out
}

pub fn render_job_detail(job: &Job) -> String {
    let mut out = String::new();
    out.push_str(&format!("id:           {}\n", job.id));
    out.push_str(&format!("command:      {}\n", job.command));
    out.push_str(&format!("state:        {}\n", job.state));
    out.push_str(&format!("attempts:     {}/{}\n", job.attempts, job.max_retries));
    out.push_str(&format!("priority:     {}\n", job.priority));
    out.push_str(&format!("run_at:       {}\n", job.run_at.to_rfc3339()));
    out.push_str(&format!("next_run_at:  {}\n", job.next_run_at.to_rfc3339()));
    out.push_str(&format!("created_at:   {}\n", job.created_at.to_rfc3339()));
    out.push_str(&format!("updated_at:   {}\n", job.updated_at.to_rfc3339()));
    out.push_str(&format!("exit_code:    {}\n", job.exit_code.map_or("-".to_string(), |c| c.to_string())));
    out.push_str(&format!("error:        {}\n", job.error.as_deref().unwrap_or("-")));
    out.push_str(&format!("claimed_by:   {}\n", job.claimed_by.as_deref().unwrap_or("-")));
    out.push_str("--- stdout ---\n");
    out.push_str(&job.stdout);
    if !job.stdout.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("--- stderr ---\n");
    out.push_str(&job.stderr);
    if !job.stderr.ends_with('\n') {
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_job_list_renders_a_placeholder() {
        assert_eq!(render_jobs(&[]), "(no jobs)\n");
    }

    #[test]
    fn counts_render_every_known_state_even_when_absent() {
        let counts = BTreeMap::new();
        let rendered = render_counts(&counts);
        assert!(rendered.contains("pending"));
        assert!(rendered.contains("dead"));
    }
}
