//! Table formatting for CLI listings.
//!
//! Columns are padded to the widest cell, like `docker ps`.

use std::fmt::Write;

use hutch_core::network::Network;
use hutch_runtime::container::ContainerRecord;

/// Renders container records as a table with a header row.
#[must_use]
pub fn container_table(records: &[ContainerRecord]) -> String {
    let rows = records
        .iter()
        .map(|r| {
            vec![
                r.id.to_string(),
                r.name.clone(),
                r.pid.map_or_else(String::new, |p| p.to_string()),
                r.status.to_string(),
                r.command.clone(),
                r.created.clone(),
            ]
        })
        .collect::<Vec<_>>();
    table(&["ID", "NAME", "PID", "STATUS", "COMMAND", "CREATED"], &rows)
}

/// Renders networks as a table with a header row.
#[must_use]
pub fn network_table(networks: &[Network]) -> String {
    let rows = networks
        .iter()
        .map(|n| vec![n.name.clone(), n.ip_range.to_string(), n.driver.clone()])
        .collect::<Vec<_>>();
    table(&["NAME", "IP RANGE", "DRIVER"], &rows)
}

fn table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = String::new();
    let header: Vec<String> = headers.iter().map(ToString::to_string).collect();
    for row in std::iter::once(&header).chain(rows) {
        let line = row
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ");
        let _ = writeln!(out, "{}", line.trim_end());
    }
    out
}

#[cfg(test)]
mod tests {
    use hutch_common::types::ContainerId;

    use super::*;

    #[test]
    fn columns_align_to_widest_cell() {
        let rendered = table(&["A", "B"], &[vec!["long-value".into(), "x".into()]]);
        assert_eq!(rendered, "A           B\nlong-value  x\n");
    }

    #[test]
    fn stopped_container_has_empty_pid() {
        let mut record =
            ContainerRecord::running(ContainerId::new("abc"), 7, None, &["top".into()], "busybox");
        record.mark_stopped();
        let rendered = container_table(&[record]);
        let row = rendered.lines().nth(1).unwrap();
        let cells: Vec<&str> = row.split_whitespace().collect();
        assert_eq!(cells[..4], ["abc", "abc", "stopped", "top"]);
    }

    #[test]
    fn network_rows_show_gateway_range() {
        let network = Network {
            name: "testbr".into(),
            ip_range: "172.18.0.1/24".parse().unwrap(),
            driver: "bridge".into(),
        };
        let rendered = network_table(&[network]);
        assert!(rendered.lines().nth(1).unwrap().contains("172.18.0.1/24"));
    }
}
