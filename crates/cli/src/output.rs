//! Output formatting and terminal rendering

use colored::Colorize;
use reel_engine::{BeatSlice, JobState, JobStatus, SongSegment, TimelineSegment};

/// Print a section header
pub fn print_header(text: &str) {
    println!();
    println!("{}", format!("▶ {}", text).bright_yellow().bold());
    println!("{}", "─".repeat(60).dimmed());
}

/// Print a success message
pub fn print_success(text: &str) {
    println!("{} {}", "✓".bright_green(), text.bright_white());
}

/// Print an error message
pub fn print_error(text: &str) {
    println!("{} {}", "✗".bright_red(), text.bright_red());
}

/// Print a warning message
pub fn print_warning(text: &str) {
    println!("{} {}", "⚠".bright_yellow(), text.yellow());
}

/// Print an info message
pub fn print_info(text: &str) {
    println!("{} {}", "ℹ".bright_blue(), text);
}

fn field(label: &str, value: impl std::fmt::Display) {
    println!("  {:<12} {}", format!("{label}:").dimmed(), value);
}

pub fn print_status(status: &JobStatus) {
    let state = match status.status {
        JobState::Queued => "queued".normal(),
        JobState::Running => "running".bright_cyan(),
        JobState::Complete => "complete".bright_green(),
        JobState::Error => "error".bright_red(),
    };

    print_header(&format!("Job {}", status.job_id));
    field("Status", state);
    field("Step", status.step.as_str());
    field("Progress", format!("{:.0}%", status.progress * 100.0));
    if !status.message.is_empty() {
        field("Message", &status.message);
    }
    field("Updated", status.updated_at.to_rfc3339());

    if let Some(artifacts) = &status.artifacts {
        println!();
        field("Final", artifacts.final_path.display());
        field("Preview", artifacts.preview.display());
        field("EDL", artifacts.edl.display());
    }
}

pub fn print_timeline(timeline: &[TimelineSegment]) {
    println!(
        "  {:<4} {:<6} {:>8} {:>8} {:>8}",
        "#".bold(),
        "Clip".bold(),
        "In".bold(),
        "Out".bold(),
        "Length".bold()
    );
    for (i, segment) in timeline.iter().enumerate() {
        println!(
            "  {:<4} {:<6} {:>8.3} {:>8.3} {:>8.3}",
            (i + 1).to_string().dimmed(),
            segment.clip_id.bright_white(),
            segment.in_s,
            segment.out_s,
            segment.duration()
        );
    }
    let total: f64 = timeline.iter().map(TimelineSegment::duration).sum();
    println!("  {}", format!("{} segments, {:.3}s", timeline.len(), total).dimmed());
}

pub fn print_song(segment: &SongSegment, beats: Option<&BeatSlice>) {
    print_header("Song segment");
    field("Start", format!("{:.3}s", segment.start_s));
    field("End", format!("{:.3}s", segment.end_s));
    field("Method", segment.method.as_str());
    field("Snap", segment.snap.as_str());
    if segment.loop_audio {
        print_warning("Song is shorter than the target and will be looped");
    }

    match beats {
        Some(slice) => {
            field("Tempo", format!("{:.2} BPM", slice.tempo));
            field("Beats", slice.beats.len());
            field("Downbeats", slice.downbeats.len());
        }
        None => print_info("No beat grid available"),
    }
}
