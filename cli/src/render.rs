use console::style;
use termimad::MadSkin;
use versa_core::agent::{Event, ObservationKind};
use versa_core::{LoopState, TaskContext};

const OBSERVATION_PREVIEW_LINES: usize = 12;

pub fn state_label(state: LoopState) -> &'static str {
    match state {
        LoopState::Finished => "finished",
        LoopState::Exhausted => "step budget exhausted",
        LoopState::Failed => "failed",
        LoopState::Cancelled => "cancelled",
        _ => "running",
    }
}

fn preview(text: &str) -> String {
    let mut lines: Vec<&str> = text.lines().take(OBSERVATION_PREVIEW_LINES).collect();
    let total = text.lines().count();
    if total > OBSERVATION_PREVIEW_LINES {
        lines.push("...");
    }
    lines.join("\n")
}

fn print_event(event: &Event) {
    let marker = match event.observation.kind {
        ObservationKind::Output => style("✓").green(),
        ObservationKind::ToolError => style("✗").red(),
        ObservationKind::Timeout => style("⏱").yellow(),
    };

    println!("{} {}", marker, style(&event.action).bold());
    if let Some(requested) = &event.requested_tool {
        println!(
            "  {}",
            style(format!("'{}' is not available, used {}", requested, event.tool)).yellow()
        );
    }
    for line in preview(&event.observation.text).lines() {
        println!("  {}", style(line).dim());
    }
}

pub fn print_outcome(ctx: &TaskContext) {
    println!();
    for event in ctx.history.iter() {
        print_event(event);
    }

    let summary = format!(
        "Task {} after {} step(s)",
        state_label(ctx.state),
        ctx.step_count
    );
    let summary = match ctx.state {
        LoopState::Finished => style(summary).green().bold(),
        LoopState::Exhausted => style(summary).yellow().bold(),
        _ => style(summary).red().bold(),
    };

    println!();
    println!("{}", summary);
    println!();
    MadSkin::default().print_text(&ctx.last_result);
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_truncates_long_output() {
        let text = (0..20).map(|i| i.to_string()).collect::<Vec<_>>().join("\n");
        let shown = preview(&text);
        assert_eq!(shown.lines().count(), OBSERVATION_PREVIEW_LINES + 1);
        assert!(shown.ends_with("..."));
        assert_eq!(preview("a\nb"), "a\nb");
    }

    #[test]
    fn labels_terminal_states() {
        assert_eq!(state_label(LoopState::Exhausted), "step budget exhausted");
        assert_eq!(state_label(LoopState::Selecting), "running");
    }
}
