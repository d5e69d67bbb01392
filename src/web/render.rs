//! HTML rendering for the dashboard.
//!
//! Templates are embedded with `include_str!` and filled by simple string
//! replacement; row-level markup is built here.

use super::chart::Chart;
use super::Prefs;
use crate::db::{Folder, Node};
use crate::probe::TargetReport;

const LAYOUT_TEMPLATE: &str = include_str!("templates/layout.html");
const INDEX_TEMPLATE: &str = include_str!("templates/index.html");

/// Everything the index page needs.
pub struct IndexCtx<'a> {
    pub folders: &'a [Folder],
    pub selected_folder: Option<&'a Folder>,
    pub selected_node: Option<&'a Node>,
    pub test_results: Option<&'a [TargetReport]>,
    pub chart: Option<&'a Chart>,
    pub prefs: &'a Prefs,
    pub runs: u32,
}

/// Render the full dashboard page.
pub fn render_index(ctx: &IndexCtx) -> String {
    let content = INDEX_TEMPLATE
        .replace("{{folder_pane}}", &render_folder_pane(ctx))
        .replace("{{detail_pane}}", &render_detail_pane(ctx))
        .replace("{{results_section}}", &render_results(ctx))
        .replace("{{preferences_form}}", &render_preferences(ctx.prefs));

    LAYOUT_TEMPLATE
        .replace("{{title}}", "urlpulse")
        .replace("{{theme}}", &ctx.prefs.theme)
        .replace("{{content}}", &content)
}

/// Escape text for safe embedding in HTML.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

fn render_folder_pane(ctx: &IndexCtx) -> String {
    let mut items = String::new();
    for folder in ctx.folders {
        let selected = ctx
            .selected_folder
            .map(|f| f.id == folder.id)
            .unwrap_or(false);
        items.push_str(&format!(
            "<li class=\"{}\"><a href=\"/?folder_id={}\">{}</a> <span class=\"count\">({})</span></li>\n",
            if selected { "selected" } else { "" },
            folder.id,
            escape_html(&folder.name),
            folder.nodes.len(),
        ));
    }

    format!(
        r#"<form method="post" action="/folders/add" class="inline">
  <input type="text" name="name" placeholder="New folder" required>
  <button type="submit">Add folder</button>
</form>
<ul class="folder-list">
{}</ul>"#,
        items
    )
}

fn render_detail_pane(ctx: &IndexCtx) -> String {
    if let Some(node) = ctx.selected_node {
        return render_node_pane(node);
    }
    if let Some(folder) = ctx.selected_folder {
        return render_folder_detail(folder);
    }
    "<p class=\"hint\">Select a folder to manage its URLs.</p>".to_string()
}

fn render_node_pane(node: &Node) -> String {
    format!(
        r#"<h2>{name}</h2>
<form method="post" action="/nodes/{id}/edit" class="stack">
  <label>Name <input type="text" name="name" value="{name}" required></label>
  <label>URL <input type="url" name="url" value="{url}" required></label>
  <label>Comment <input type="text" name="comment" value="{comment}"></label>
  <label><input type="checkbox" name="active" value="on"{checked}> Active</label>
  <button type="submit">Save</button>
</form>
<div class="actions">
  <form method="post" action="/nodes/{id}/test/html" class="inline"><button type="submit">Test</button></form>
  <form method="post" action="/nodes/{id}/duplicate" class="inline"><button type="submit">Duplicate</button></form>
  <form method="post" action="/nodes/{id}/toggle_active" class="inline"><button type="submit">{toggle}</button></form>
  <form method="post" action="/nodes/{id}/delete" class="inline"><button type="submit" class="danger">Delete</button></form>
</div>"#,
        id = node.id,
        name = escape_html(&node.name),
        url = escape_html(&node.url),
        comment = escape_html(&node.comment),
        checked = if node.active { " checked" } else { "" },
        toggle = if node.active { "Deactivate" } else { "Activate" },
    )
}

fn render_folder_detail(folder: &Folder) -> String {
    let mut rows = String::new();
    for node in &folder.nodes {
        rows.push_str(&format!(
            r#"<tr class="{row_class}">
  <td><input type="checkbox" name="node_ids" value="{id}" form="selection-form"></td>
  <td><a href="/?node_id={id}">{name}</a></td>
  <td class="url">{url}</td>
  <td>{active}</td>
  <td><form method="post" action="/nodes/{id}/toggle_active" class="inline"><button type="submit">{toggle}</button></form></td>
</tr>
"#,
            row_class = if node.active { "" } else { "inactive" },
            id = node.id,
            name = escape_html(&node.name),
            url = escape_html(&node.url),
            active = if node.active { "active" } else { "inactive" },
            toggle = if node.active { "off" } else { "on" },
        ));
    }

    format!(
        r#"<h2>{name}</h2>
<div class="actions">
  <form method="post" action="/folders/{id}/rename" class="inline">
    <input type="text" name="name" value="{name}" required>
    <button type="submit">Rename</button>
  </form>
  <form method="post" action="/folders/{id}/duplicate" class="inline"><button type="submit">Duplicate</button></form>
  <form method="post" action="/folders/{id}/delete" class="inline"><button type="submit" class="danger">Delete folder</button></form>
</div>
<form method="post" action="/folders/{id}/test/html" class="inline">
  <label>Runs <input type="number" name="runs" value="1" min="1" max="100" size="4"></label>
  <button type="submit">Test all</button>
</form>
<form id="selection-form" method="post" action="/folders/{id}/test_selected/html" class="inline">
  <input type="hidden" name="folder_id" value="{id}">
  <button type="submit">Test selected</button>
  <button type="submit" formaction="/nodes/bulk_delete" class="danger">Delete selected</button>
</form>
<table class="nodes">
  <thead><tr><th></th><th>Name</th><th>URL</th><th>State</th><th></th></tr></thead>
  <tbody>
{rows}  </tbody>
</table>
<h3>Add URL</h3>
<form method="post" action="/nodes/add" class="stack">
  <input type="hidden" name="folder_id" value="{id}">
  <label>Name <input type="text" name="name" required></label>
  <label>URL <input type="url" name="url" placeholder="https://" required></label>
  <label>Comment <input type="text" name="comment"></label>
  <label><input type="checkbox" name="active" value="on" checked> Active</label>
  <button type="submit">Add</button>
</form>"#,
        id = folder.id,
        name = escape_html(&folder.name),
        rows = rows,
    )
}

fn render_results(ctx: &IndexCtx) -> String {
    let Some(results) = ctx.test_results else {
        return String::new();
    };

    let mut rows = String::new();
    for (idx, r) in results.iter().enumerate() {
        let status = if !r.tested {
            "<span class=\"badge skipped\">skipped (Node inactive)</span>".to_string()
        } else if r.ok == Some(true) {
            format!(
                "<span class=\"badge ok\">OK ({})</span>",
                r.status_code.unwrap_or(0)
            )
        } else if let Some(code) = r.status_code {
            format!("<span class=\"badge fail\">FAIL ({})</span>", code)
        } else {
            format!(
                "<span class=\"badge fail\">{}</span>",
                escape_html(r.error.as_deref().unwrap_or("error"))
            )
        };

        rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td class=\"url\">{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            idx + 1,
            escape_html(&r.name),
            escape_html(&r.url),
            status,
            r.elapsed_ms.map(|ms| format!("{} ms", ms)).unwrap_or_default(),
            match (r.avg_ms, r.min_ms, r.max_ms) {
                (Some(avg), Some(min), Some(max)) =>
                    format!("{} / {} / {} ms", avg, min, max),
                _ => String::new(),
            },
            r.errors.map(|e| e.to_string()).unwrap_or_default(),
        ));
    }

    let chart_svg = ctx.chart.map(render_chart_svg).unwrap_or_default();
    let summary_line = ctx
        .chart
        .map(|c| {
            format!(
                "{} URLs, {} measured, average {}",
                c.count_total,
                c.count_measured,
                c.avg_ms
                    .map(|ms| format!("{} ms", ms))
                    .unwrap_or_else(|| "n/a".to_string()),
            )
        })
        .unwrap_or_default();
    let runs_line = if ctx.runs > 1 {
        format!("<p class=\"runs\">{} runs per URL</p>", ctx.runs)
    } else {
        String::new()
    };

    format!(
        r#"<section class="results">
<h2>Test results</h2>
<p class="summary">{summary}</p>
{runs}
<table class="results">
  <thead><tr><th>#</th><th>Name</th><th>URL</th><th>Status</th><th>Time</th><th>avg/min/max</th><th>Errors</th></tr></thead>
  <tbody>
{rows}  </tbody>
</table>
{chart}
</section>"#,
        summary = summary_line,
        runs = runs_line,
        rows = rows,
        chart = chart_svg,
    )
}

/// Render the chart geometry as inline SVG.
fn render_chart_svg(chart: &Chart) -> String {
    let mut parts = Vec::new();
    parts.push(format!(
        "<svg class=\"chart\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\" role=\"img\">",
        w = chart.width,
        h = chart.height,
    ));

    for tick in &chart.y_ticks {
        parts.push(format!(
            "<line x1=\"{x1}\" y1=\"{y}\" x2=\"{x2}\" y2=\"{y}\" class=\"grid\"/>",
            x1 = chart.margin_left,
            x2 = chart.margin_left + chart.plot_w,
            y = tick.y,
        ));
        parts.push(format!(
            "<text x=\"{x}\" y=\"{y}\" text-anchor=\"end\" class=\"tick\">{label}</text>",
            x = chart.margin_left - 6,
            y = tick.y + 4,
            label = tick.label,
        ));
    }

    for bar in &chart.series {
        parts.push(format!(
            "<rect x=\"{x}\" y=\"{y}\" width=\"{w}\" height=\"{h}\" fill=\"{color}\"><title>{label}: {ms} ms</title></rect>",
            x = bar.x,
            y = bar.y,
            w = bar.width,
            h = bar.height,
            color = bar.color,
            label = escape_html(&bar.label),
            ms = bar.ms,
        ));
        if bar.show_xlabel {
            parts.push(format!(
                "<text x=\"{x}\" y=\"{y}\" text-anchor=\"middle\" class=\"tick\">{label}</text>",
                x = bar.x + bar.width / 2,
                y = chart.baseline_y + 14,
                label = bar.xlabel,
            ));
        }
    }

    parts.push(format!(
        "<line x1=\"{x1}\" y1=\"{y}\" x2=\"{x2}\" y2=\"{y}\" class=\"baseline\"/>",
        x1 = chart.margin_left,
        x2 = chart.margin_left + chart.plot_w,
        y = chart.baseline_y,
    ));

    if let (Some(avg_y), Some(avg_ms)) = (chart.avg_y, chart.avg_ms) {
        parts.push(format!(
            "<line x1=\"{x1}\" y1=\"{y}\" x2=\"{x2}\" y2=\"{y}\" class=\"avg\"/>",
            x1 = chart.margin_left,
            x2 = chart.margin_left + chart.plot_w,
            y = avg_y,
        ));
        parts.push(format!(
            "<text x=\"{x}\" y=\"{y}\" class=\"avg-label\">avg {ms} ms</text>",
            x = chart.margin_left + chart.plot_w - 4,
            y = avg_y.saturating_sub(4),
            ms = avg_ms,
        ));
    }

    parts.push("</svg>".to_string());
    parts.join("\n")
}

fn render_preferences(prefs: &Prefs) -> String {
    format!(
        r#"<form method="post" action="/preferences" class="inline prefs">
  <label><input type="checkbox" name="dark_mode" value="on"{checked}> Dark mode</label>
  <label>Timeout (s) <input type="number" name="timeout_seconds" value="{timeout}" min="1" max="120" size="4"></label>
  <button type="submit">Save preferences</button>
</form>"#,
        checked = if prefs.theme == "dark" { " checked" } else { "" },
        timeout = prefs.timeout_secs,
    )
}
