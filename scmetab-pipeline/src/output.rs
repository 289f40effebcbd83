use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use scmetab_core::utils::format_stat;

use crate::scoring::{ActivityMatrix, GroupMatrix, PathwayTest};

/// Pathway activity per group, long format.
pub fn write_activity(
    path: &Path,
    grouping_name: &str,
    activity: &ActivityMatrix,
) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "pathway\t{}\tactivity\tp_value", grouping_name)?;
    for (p, pathway) in activity.pathways.iter().enumerate() {
        for (g, group) in activity.groups.iter().enumerate() {
            writeln!(
                writer,
                "{}\t{}\t{}\t{}",
                pathway,
                group,
                format_stat(activity.activity[[p, g]]),
                format_stat(activity.p_value[[p, g]]),
            )?;
        }
    }
    writer.flush()
}

/// Pathway heterogeneity per group, long format.
pub fn write_heterogeneity(
    path: &Path,
    grouping_name: &str,
    heterogeneity: &GroupMatrix,
) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "pathway\t{}\tcv", grouping_name)?;
    for (p, pathway) in heterogeneity.pathways.iter().enumerate() {
        for (g, group) in heterogeneity.groups.iter().enumerate() {
            writeln!(
                writer,
                "{}\t{}\t{}",
                pathway,
                group,
                format_stat(heterogeneity.values[[p, g]]),
            )?;
        }
    }
    writer.flush()
}

/// Group-vs-rest enrichment within one subset.
pub fn write_enrichment(
    path: &Path,
    grouping_name: &str,
    results: &[(String, Vec<PathwayTest>)],
) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(
        writer,
        "{}\tpathway\tlog2_ratio\tp_value\tq_value",
        grouping_name
    )?;
    for (group, tests) in results {
        for test in tests {
            writeln!(
                writer,
                "{}\t{}\t{}\t{}\t{}",
                group,
                test.pathway,
                format_stat(test.log2_ratio),
                format_stat(test.p_value),
                format_stat(test.q_value),
            )?;
        }
    }
    writer.flush()
}

/// Arm-vs-baseline enrichment for one design.
pub fn write_design_enrichment(
    path: &Path,
    results: &[(String, Vec<PathwayTest>)],
) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "comparison\tpathway\tlog2_ratio\tp_value\tq_value")?;
    for (comparison, tests) in results {
        for test in tests {
            writeln!(
                writer,
                "{}\t{}\t{}\t{}\t{}",
                comparison,
                test.pathway,
                format_stat(test.log2_ratio),
                format_stat(test.p_value),
                format_stat(test.q_value),
            )?;
        }
    }
    writer.flush()
}

#[derive(Serialize, Debug)]
pub struct SubsetReport {
    pub name: String,
    pub n_cells: usize,
    pub n_groups: usize,
}

#[derive(Serialize, Debug)]
pub struct SkippedReport {
    pub job: String,
    pub reason: String,
}

/// Machine-readable run summary accompanying the tabular outputs.
#[derive(Serialize, Debug)]
pub struct RunReport {
    pub grouping_name: String,
    pub subsets: Vec<SubsetReport>,
    pub designs: Vec<String>,
    pub gene_sets_used: usize,
    pub gene_sets_dropped: usize,
    pub outputs: Vec<String>,
    pub skipped: Vec<SkippedReport>,
}

pub fn write_report(path: &Path, report: &RunReport) -> io::Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, report).map_err(io::Error::other)
}
