use comfy_table::{Cell, Table};

use crate::workload::PhaseReport;

/// Renders per-phase counter deltas, one row per phase plus a total.
pub fn format_phase_table(title: &str, reports: &[PhaseReport]) -> String {
    let mut table = Table::new();
    table.set_header(
        ["phase", "reads", "writes", "allocs", "frees", "pins"]
            .into_iter()
            .map(Cell::new)
            .collect::<Vec<_>>(),
    );

    let mut totals = [0u64; 5];
    for report in reports {
        let counts = counts(report);
        for (total, count) in totals.iter_mut().zip(counts) {
            *total += count;
        }
        table.add_row(row(&report.label, counts));
    }
    table.add_row(row("total", totals));

    format!("{}\n{}", title, table)
}

pub fn print_phase_table(title: &str, reports: &[PhaseReport]) {
    println!("{}", format_phase_table(title, reports));
}

fn counts(report: &PhaseReport) -> [u64; 5] {
    let stats = &report.stats;
    [
        stats.disk_reads,
        stats.disk_writes,
        stats.allocations,
        stats.deallocations,
        stats.pins,
    ]
}

fn row(label: &str, counts: [u64; 5]) -> Vec<Cell> {
    std::iter::once(Cell::new(label))
        .chain(counts.into_iter().map(Cell::new))
        .collect()
}
