use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Layout, Position, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span},
    widgets::{
        Block, Cell, Clear, Paragraph, Row, Scrollbar, ScrollbarOrientation, ScrollbarState,
        Table, TableState, Tabs, Wrap,
    },
};

use crate::domain::CMDMode;
use crate::model::UIData;
use crate::state::WizardStep;
use crate::view::SortDirection;

pub const TABS_HEIGHT: usize = 1;
pub const TABLE_HEADER_HEIGHT: usize = 1;
pub const CMDLINE_HEIGH: usize = 2; // info line + command line
pub const SCROLLBAR_WIDTH: usize = 1;
pub const COLUMN_WIDTH_MARGIN: usize = 1;

pub fn draw(uidata: &UIData, frame: &mut Frame) {
    let [tabs_area, main_area, info_area, cmd_area] = Layout::vertical([
        Constraint::Length(TABS_HEIGHT as u16),
        Constraint::Min(0),
        Constraint::Length(1),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    draw_tabs(uidata, frame, tabs_area);
    draw_table(uidata, frame, main_area);
    draw_info(uidata, frame, info_area);
    draw_cmdline(uidata, frame, cmd_area);

    if uidata.show_popup {
        draw_popup(&uidata.popup_message, frame);
    }
}

fn step_name(step: WizardStep) -> &'static str {
    match step {
        WizardStep::Upload => "Upload",
        WizardStep::Manage => "Manage",
        WizardStep::Results => "Results",
    }
}

fn draw_tabs(uidata: &UIData, frame: &mut Frame, area: Rect) {
    let steps: Vec<Span> = [WizardStep::Upload, WizardStep::Manage, WizardStep::Results]
        .into_iter()
        .enumerate()
        .flat_map(|(i, step)| {
            let style = if step == uidata.step {
                Style::new().bold().fg(Color::Yellow)
            } else if uidata.available_steps.contains(&step) {
                Style::new()
            } else {
                Style::new().fg(Color::DarkGray)
            };
            let sep = if i == 0 { "" } else { " > " };
            [Span::raw(sep), Span::styled(step_name(step), style)]
        })
        .collect();
    let steps = Line::from(steps);
    let [tabs_area, steps_area] = Layout::horizontal([
        Constraint::Min(0),
        Constraint::Length(steps.width() as u16 + 1),
    ])
    .areas(area);

    let tabs = Tabs::new(uidata.tabs.iter().map(|t| Line::from(t.as_str())))
        .select(uidata.selected_tab)
        .highlight_style(Style::new().reversed());
    frame.render_widget(tabs, tabs_area);
    frame.render_widget(Paragraph::new(steps).alignment(Alignment::Right), steps_area);
}

fn draw_table(uidata: &UIData, frame: &mut Frame, area: Rect) {
    if uidata.table.is_empty() {
        let message = Paragraph::new("No data loaded. Run `invopt upload <FILES>` or press ? for help.")
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true });
        frame.render_widget(message, area);
        return;
    }

    let index_width = if uidata.show_index {
        uidata.layout.index_width as u16 + 1
    } else {
        0
    };
    let [index_area, table_area, scrollbar_area] = Layout::horizontal([
        Constraint::Length(index_width),
        Constraint::Min(0),
        Constraint::Length(SCROLLBAR_WIDTH as u16),
    ])
    .areas(area);

    if uidata.show_index {
        let mut lines = vec![Line::from("#".bold())];
        lines.extend(
            uidata
                .index
                .data
                .iter()
                .map(|id| Line::from(id.as_str().dark_gray())),
        );
        frame.render_widget(Paragraph::new(lines).alignment(Alignment::Right), index_area);
    }

    let header = Row::new(
        uidata
            .table
            .iter()
            .map(|c| Cell::from(c.name.as_str())),
    )
    .style(Style::new().add_modifier(Modifier::BOLD | Modifier::UNDERLINED));

    let nrows = uidata.table.iter().map(|c| c.data.len()).max().unwrap_or(0);
    let rows = (0..nrows).map(|r| {
        Row::new(uidata.table.iter().map(|c| {
            Cell::from(c.data.get(r).map(String::as_str).unwrap_or(""))
        }))
    });
    let widths = uidata
        .table
        .iter()
        .map(|c| Constraint::Length(c.width as u16));

    let table = Table::new(rows, widths)
        .header(header)
        .column_spacing(COLUMN_WIDTH_MARGIN as u16)
        .row_highlight_style(Style::new().bg(Color::DarkGray))
        .cell_highlight_style(Style::new().bg(Color::Blue).fg(Color::White));
    let mut state = TableState::default();
    state.select(Some(uidata.selected_row));
    state.select_column(Some(uidata.selected_column));
    frame.render_stateful_widget(table, table_area, &mut state);

    let mut scrollbar_state = ScrollbarState::new(uidata.nrows)
        .position(uidata.page * uidata.page_size + uidata.selected_row);
    frame.render_stateful_widget(
        Scrollbar::new(ScrollbarOrientation::VerticalRight),
        scrollbar_area,
        &mut scrollbar_state,
    );
}

fn draw_info(uidata: &UIData, frame: &mut Frame, area: Rect) {
    let page_info = format!(
        "page {}/{}, {} matches",
        if uidata.page_count == 0 { 0 } else { uidata.page + 1 },
        uidata.page_count,
        uidata.nrows
    );
    let [left, right] = Layout::horizontal([
        Constraint::Min(0),
        Constraint::Length(page_info.chars().count() as u16 + 1),
    ])
    .areas(area);

    let mut description = Vec::new();
    if let Some(summary) = &uidata.summary {
        description.push(Span::styled(summary.as_str(), Style::new().fg(Color::Green)));
    }
    if let Some(sort) = &uidata.sort {
        let arrow = match sort.direction {
            SortDirection::Ascending => "▲",
            SortDirection::Descending => "▼",
        };
        description.push(Span::raw(format!(" sort: {} {arrow}", sort.column)));
    }
    if !uidata.filter.is_empty() {
        description.push(Span::raw(format!(" filter: \"{}\"", uidata.filter)));
    }
    frame.render_widget(Paragraph::new(Line::from(description)), left);
    frame.render_widget(
        Paragraph::new(page_info).alignment(Alignment::Right).reversed(),
        right,
    );
}

fn draw_cmdline(uidata: &UIData, frame: &mut Frame, area: Rect) {
    if !uidata.active_cmdinput {
        frame.render_widget(Paragraph::new(uidata.status_message.as_str()), area);
        return;
    }
    let prompt = match uidata.cmd_mode {
        Some(CMDMode::Filter) => "/",
        Some(CMDMode::EditCell) => "edit: ",
        None => ":",
    };
    let prompt_width = prompt.chars().count();
    let visible = area.width as usize - std::cmp::min(prompt_width, area.width as usize);
    let skip = (uidata.cmdinput.curser_pos + 1).saturating_sub(visible);
    let input: String = uidata.cmdinput.input.chars().skip(skip).collect();
    let line = Line::from(vec![Span::raw(prompt).bold(), Span::raw(input)]);
    frame.render_widget(Paragraph::new(line), area);
    frame.set_cursor_position(Position::new(
        area.x + (prompt_width + uidata.cmdinput.curser_pos.saturating_sub(skip)) as u16,
        area.y,
    ));
}

fn draw_popup(message: &str, frame: &mut Frame) {
    let [_, vertical, _] = Layout::vertical([
        Constraint::Percentage(10),
        Constraint::Percentage(80),
        Constraint::Percentage(10),
    ])
    .areas(frame.area());
    let [_, area, _] = Layout::horizontal([
        Constraint::Percentage(20),
        Constraint::Percentage(60),
        Constraint::Percentage(20),
    ])
    .areas(vertical);
    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(message).block(
            Block::bordered()
                .title(Line::from(" Help ").centered())
                .title_bottom(Line::from(" Esc to close ").centered()),
        ),
        area,
    );
}
