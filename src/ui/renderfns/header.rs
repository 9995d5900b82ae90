use crate::ui::view::ShortcutInfo;
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

/// Draw the header bar with title, view context, and shortcuts
pub fn draw_header(
  frame: &mut Frame,
  area: Rect,
  title: &str,
  context: Option<&str>,
  shortcuts: &[ShortcutInfo],
) {
  let mut spans = vec![
    Span::styled(" eventdesk ", Style::default().fg(Color::Cyan).bold()),
    Span::styled("│", Style::default().fg(Color::DarkGray)),
    Span::styled(format!(" {} ", title), Style::default().fg(Color::White)),
  ];

  if let Some(context) = context {
    spans.push(Span::styled("│", Style::default().fg(Color::DarkGray)));
    spans.push(Span::styled(
      format!(" {} ", context),
      Style::default().fg(Color::Yellow).bold(),
    ));
  }

  spans.push(Span::raw(" "));
  for shortcut in sorted_shortcuts(shortcuts) {
    spans.push(Span::raw("  "));
    spans.push(Span::styled(
      format!("<{}>", shortcut.key),
      Style::default().fg(Color::Cyan),
    ));
    spans.push(Span::styled(
      format!(" {}", shortcut.label),
      Style::default().fg(Color::DarkGray),
    ));
  }

  let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
  frame.render_widget(paragraph, area);
}

fn sorted_shortcuts(shortcuts: &[ShortcutInfo]) -> Vec<&ShortcutInfo> {
  let mut sorted: Vec<&ShortcutInfo> = shortcuts.iter().collect();
  sorted.sort_by_key(|s| s.priority);
  sorted
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_shortcuts_sorted_by_priority() {
    let shortcuts = vec![
      ShortcutInfo::new("q", "back").with_priority(90),
      ShortcutInfo::new(":", "command").with_priority(10),
      ShortcutInfo::new("t", "trigger"),
    ];
    let keys: Vec<&str> = sorted_shortcuts(&shortcuts).iter().map(|s| s.key).collect();
    assert_eq!(keys, vec![":", "q", "t"]);
  }
}
