//! `huddle history`: print recent messages from the local database.

use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use huddle_core::repository::message::MessageRepository;
use huddle_types::message::{MessageKind, StoredMessage};

/// Longest message text shown in a table cell before truncation.
const MAX_TEXT_CHARS: usize = 60;

pub async fn show_history<R: MessageRepository>(
    repository: &R,
    limit: u32,
    json: bool,
) -> anyhow::Result<()> {
    let messages = repository.load_history(Some(limit)).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&messages)?);
        return Ok(());
    }

    if messages.is_empty() {
        println!();
        println!(
            "  {} No messages yet. Start the server with: {}",
            style("i").blue().bold(),
            style("huddle serve").yellow()
        );
        println!();
        return Ok(());
    }

    println!();
    println!("{}", render_table(&messages));
    println!();
    Ok(())
}

fn render_table(messages: &[StoredMessage]) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Time").fg(Color::White),
        Cell::new("Sender").fg(Color::White),
        Cell::new("Message").fg(Color::White),
    ]);

    for message in messages {
        let sender_color = match message.kind {
            MessageKind::UserMessage => Color::Cyan,
            MessageKind::AssistantMessage => Color::Magenta,
        };
        table.add_row(vec![
            Cell::new(message.created_at.format("%Y-%m-%d %H:%M:%S").to_string()).fg(Color::DarkGrey),
            Cell::new(&message.sender).fg(sender_color),
            Cell::new(truncate(&message.text, MAX_TEXT_CHARS)),
        ]);
    }
    table
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{kept}...")
}
