use colored::{ColoredString, Colorize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Write as _;

use crate::models::{AggregatedResult, MultiResult, Severity, TaskResult};

const WIDTH: usize = 80;

/// Print the template variables handed to a task for one host
pub fn print_data(host: &str, data: &HashMap<String, Value>) {
    let rendered = serde_json::to_string(data).unwrap_or_else(|_| format!("{:?}", data));
    println!("{} {}", format!("{}:", host).bold(), rendered);
}

/// Print every host's results. Results below INFO are hidden unless `verbose`.
pub fn print_result(result: &AggregatedResult, verbose: bool) {
    if result.is_empty() {
        return;
    }
    print!("{}", format_result(result, verbose));
}

pub fn format_result(result: &AggregatedResult, verbose: bool) -> String {
    let min = if verbose { Severity::Debug } else { Severity::Info };
    let mut out = String::new();

    let _ = writeln!(out, "{}", banner(&result.name, '*').cyan().bold());
    for (host, multi) in result.iter() {
        let header = format!("* {} ** changed : {} ", host, multi.changed());
        let _ = writeln!(out, "{}", colorize(&banner(&header, '*'), multi.failed(), multi.changed()).bold());
        format_multi(&mut out, multi, min);
    }
    out
}

fn format_multi(out: &mut String, multi: &MultiResult, min: Severity) {
    if multi.is_empty() {
        return;
    }
    for (i, r) in multi.iter().enumerate() {
        if r.severity < min {
            continue;
        }
        let marker = if i == 0 { "vvvv" } else { "----" };
        let fill = if i == 0 { 'v' } else { '-' };
        let title = format!("{} {} ** changed : {} ", marker, r.name, r.changed);
        let line = format!("{} {}", banner_width(&title, fill, WIDTH - 8), r.severity.as_str());
        let _ = writeln!(out, "{}", colorize(&line, r.failed, r.changed));
        format_body(out, r);
    }
    let took = multi.elapsed().num_milliseconds() as f64 / 1000.0;
    let end = format!("^^^^ END {} ({:.3}s) ", multi.name, took);
    let _ = writeln!(out, "{}", colorize(&banner(&end, '^'), multi.failed(), multi.changed()));
}

fn format_body(out: &mut String, r: &TaskResult) {
    if let Some(exception) = &r.exception {
        let _ = writeln!(out, "{}", exception.red());
    } else if let Some(diff) = &r.diff {
        for line in diff.lines() {
            let _ = writeln!(out, "{}", color_diff_line(line));
        }
    } else if let Some(result) = &r.result {
        let _ = writeln!(out, "{}", crate::utils::truncate_lines(result, 200));
    }
}

fn color_diff_line(line: &str) -> ColoredString {
    let trimmed = line.trim_start();
    if trimmed.starts_with('+') {
        line.green()
    } else if trimmed.starts_with('-') {
        line.red()
    } else {
        line.normal()
    }
}

fn colorize(text: &str, failed: bool, changed: bool) -> ColoredString {
    if failed {
        text.red()
    } else if changed {
        text.yellow()
    } else {
        text.green()
    }
}

fn banner(title: &str, fill: char) -> String {
    banner_width(title, fill, WIDTH)
}

/// Pad `title` with `fill` up to `width` characters
fn banner_width(title: &str, fill: char, width: usize) -> String {
    let len = title.chars().count();
    let mut s = title.to_string();
    if len < width {
        s.extend(std::iter::repeat(fill).take(width - len));
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AggregatedResult {
        let mut multi = MultiResult::new("configure_addressbook");
        multi.push(TaskResult::new("srx1", "configure_addressbook").with_changed(true));
        multi.push(
            TaskResult::new("srx1", "junos_config")
                .with_result("set security address-book global address web-01 198.51.100.10/32")
                .with_severity(Severity::Debug),
        );
        multi.push(
            TaskResult::new("srx1", "junos_diff")
                .with_diff(Some("[edit security address-book global]\n+    address web-01 198.51.100.10/32;".into())),
        );
        let mut agg = AggregatedResult::new("configure_addressbook");
        agg.insert("srx1", multi);

        let mut failed = MultiResult::new("configure_addressbook");
        failed.push(TaskResult::failure("srx2", "configure_addressbook", &anyhow::anyhow!("connection refused")));
        agg.insert("srx2", failed);
        agg
    }

    #[test]
    fn test_banner_width() {
        assert_eq!(banner_width("ab ", '*', 6), "ab ***");
        assert_eq!(banner_width("abcdef", '*', 3), "abcdef");
    }

    #[test]
    fn test_debug_results_hidden_by_default() {
        let out = format_result(&sample(), false);
        assert!(out.contains("* srx1 ** changed : true"));
        assert!(out.contains("vvvv configure_addressbook ** changed : true"));
        assert!(out.contains("---- junos_diff ** changed : false"));
        assert!(out.contains("+    address web-01 198.51.100.10/32;"));
        assert!(!out.contains("junos_config"));
        assert!(out.contains("^^^^ END configure_addressbook"));
    }

    #[test]
    fn test_end_banner_shows_host_duration() {
        let mut multi = MultiResult::new("configure_policies");
        let mut done = TaskResult::new("srx1", "configure_policies");
        done.finished_at = multi.started_at + chrono::Duration::milliseconds(2345);
        multi.push(done);
        let mut agg = AggregatedResult::new("configure_policies");
        agg.insert("srx1", multi);

        let out = format_result(&agg, false);
        assert!(out.contains("^^^^ END configure_policies (2.345s)"));
    }

    #[test]
    fn test_verbose_shows_debug() {
        let out = format_result(&sample(), true);
        assert!(out.contains("---- junos_config ** changed : false"));
        assert!(out.contains("DEBUG"));
    }

    #[test]
    fn test_failure_shows_exception() {
        let out = format_result(&sample(), false);
        assert!(out.contains("* srx2 ** changed : false"));
        assert!(out.contains("connection refused"));
        assert!(out.contains("ERROR"));
    }
}
