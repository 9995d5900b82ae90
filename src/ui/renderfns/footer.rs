use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

/// Draw the footer bar: view breadcrumb on the left, last status on the right
pub fn draw_footer(frame: &mut Frame, area: Rect, breadcrumb: &[String], status: Option<&str>) {
  let mut spans = vec![Span::raw(" ")];

  for (i, part) in breadcrumb.iter().enumerate() {
    if i > 0 {
      spans.push(Span::styled(" > ", Style::default().fg(Color::DarkGray)));
    }

    let style = if i == breadcrumb.len() - 1 {
      Style::default().fg(Color::Cyan).bold()
    } else {
      Style::default().fg(Color::White)
    };

    spans.push(Span::styled(part.clone(), style));
  }

  let chunks = Layout::default()
    .direction(Direction::Horizontal)
    .constraints([Constraint::Min(1), Constraint::Percentage(50)])
    .split(area);

  let left = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black));
  frame.render_widget(left, chunks[0]);

  let status = Paragraph::new(format!("{} ", status.unwrap_or_default()))
    .alignment(Alignment::Right)
    .style(Style::default().bg(Color::Black).fg(Color::Yellow));
  frame.render_widget(status, chunks[1]);
}
