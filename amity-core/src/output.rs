// Console output for interactive runs. Nothing here affects program logic.

use amity_scanner::CandidateRecord;
use chrono::DateTime;
use colored::Colorize;

pub fn print_divider() {
    println!("{}", "═".repeat(60).bright_blue().bold());
}

pub fn print_step(step: usize, total: usize, message: &str) {
    println!(
        "{}",
        format!("Step {} of {} - {}", step, total, message).bold()
    );
}

pub fn extracted_friend_line(record: &CandidateRecord) -> String {
    format!(
        "{} Extracted friend: {} - {}",
        "+".green(),
        record.label.bright_white(),
        record.locator.dimmed()
    )
}

pub fn print_records_table(records: &[CandidateRecord]) {
    let label_width = records
        .iter()
        .map(|r| r.label.chars().count())
        .max()
        .unwrap_or(0)
        .max("Name".len());

    println!();
    println!(
        "  {}  {:<width$}  {}",
        " # ".bold(),
        "Name".bold(),
        "Profile".bold(),
        width = label_width
    );
    println!("  {}", "─".repeat(label_width + 40).dimmed());
    for (idx, record) in records.iter().enumerate() {
        println!(
            "  {:>3}  {:<width$}  {}",
            idx + 1,
            record.label,
            record.locator.cyan(),
            width = label_width
        );
    }
    println!();
}

pub fn print_no_data_info() {
    println!("{} No data was extracted", "✗".red().bold());
}

pub fn print_saving_notice() {
    println!(
        "{} Saving scraped data to database, it can take a while!",
        "Don't close the app!".red().bold()
    );
}

pub fn print_person_updated() {
    println!("{}", "Person table updated".green().bold());
}

pub fn format_timestamp(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}
