use iced::mouse;
use iced::widget::canvas::{self, Frame, Geometry, Path, Stroke, Text};
use iced::{Color, Font, Point, Rectangle, Renderer, Theme};
use std::f32::consts::{PI, TAU};

/// Colors needed by the canvas gauges from the active palette.
#[derive(Debug, Clone, Copy)]
pub struct GaugeColors {
    pub bg: Color,
    pub label: Color,
    pub text: Color,
    pub bar_bg: Color,
}

/// A donut chart with a count in the middle and a legend on the right.
///
/// Segment values are rendered proportionally as given; a zero-sum input
/// draws only the empty track.
#[derive(Debug, Clone)]
pub struct Donut {
    pub segments: Vec<(String, f32, Color)>,
    pub center_label: String,
    pub colors: GaugeColors,
}

impl<Message: 'static> canvas::Program<Message> for Donut {
    type State = ();

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: mouse::Cursor,
    ) -> Vec<Geometry> {
        let mut frame = Frame::new(renderer, bounds.size());
        let c = &self.colors;

        let bg = Path::rectangle(Point::ORIGIN, bounds.size());
        frame.fill(&bg, c.bg);

        // Ring on the left half, legend on the right
        let cx = bounds.width * 0.30;
        let cy = bounds.height * 0.52;
        let radius = (bounds.width.min(bounds.height) * 0.32).max(18.0);
        let thickness = (radius * 0.30).max(6.0);

        let total: f32 = self.segments.iter().map(|(_, v, _)| v.max(0.0)).sum();

        // Track
        draw_arc(&mut frame, cx, cy, radius, thickness, 90.0_f32.to_radians(), TAU, c.bar_bg);

        if total > 0.0 {
            // Segments sweep clockwise from 12 o'clock
            let mut start = 90.0_f32.to_radians();
            for (_, value, color) in &self.segments {
                let share = value.max(0.0) / total;
                if share <= 0.0 {
                    continue;
                }
                let sweep = TAU * share;
                draw_arc(&mut frame, cx, cy, radius, thickness, start, sweep, *color);
                start -= sweep;
            }
        }

        // Center count
        let mut center = Text::from(self.center_label.clone());
        center.position = Point::new(cx, cy);
        center.color = c.text;
        center.size = (radius * 0.42).max(11.0).into();
        center.font = Font::MONOSPACE;
        center.horizontal_alignment = iced::alignment::Horizontal::Center;
        center.vertical_alignment = iced::alignment::Vertical::Center;
        frame.fill_text(center);

        // Legend
        let lx = bounds.width * 0.58;
        let row_h = 16.0f32;
        let legend_h = self.segments.len() as f32 * row_h;
        let mut ly = (bounds.height - legend_h) / 2.0;
        for (name, value, color) in &self.segments {
            let dot = Path::circle(Point::new(lx, ly + 5.0), 4.0);
            frame.fill(&dot, *color);
            let mut lt = Text::from(format!("{name}: {value:.0}"));
            lt.position = Point::new(lx + 10.0, ly - 1.0);
            lt.color = c.label;
            lt.size = 11.0.into();
            frame.fill_text(lt);
            ly += row_h;
        }

        vec![frame.into_geometry()]
    }
}

/// Draw a thick arc by approximating it with many small line segments.
#[allow(clippy::too_many_arguments)]
fn draw_arc(
    frame: &mut Frame,
    cx: f32,
    cy: f32,
    radius: f32,
    thickness: f32,
    start: f32,
    sweep: f32,
    color: Color,
) {
    let segments = ((sweep.abs() / PI * 60.0) as usize).max(8);
    let step = sweep / segments as f32;
    let mut builder = canvas::path::Builder::new();
    // Arcs go clockwise in screen coordinates (y-down),
    // but our start angle is in standard math coordinates.
    // Convert: screen_angle = -math_angle
    for i in 0..=segments {
        let angle = -(start - step * i as f32);
        let x = cx + radius * angle.cos();
        let y = cy + radius * angle.sin();
        if i == 0 {
            builder.move_to(Point::new(x, y));
        } else {
            builder.line_to(Point::new(x, y));
        }
    }
    let path = builder.build();
    frame.stroke(
        &path,
        Stroke::default()
            .with_color(color)
            .with_width(thickness)
            .with_line_cap(canvas::LineCap::Butt),
    );
}

/// A tiny sparkline drawn via iced Canvas (for the metric cards).
#[derive(Debug, Clone)]
pub struct Sparkline {
    pub data: Vec<f32>,
    pub color: Color,
}

impl<Message: 'static> canvas::Program<Message> for Sparkline {
    type State = ();

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: mouse::Cursor,
    ) -> Vec<Geometry> {
        let mut frame = Frame::new(renderer, bounds.size());

        if self.data.len() < 2 {
            return vec![frame.into_geometry()];
        }

        let n = self.data.len();
        let max_val = self.data.iter().cloned().fold(1.0_f32, f32::max);
        let min_val = self.data.iter().cloned().fold(0.0_f32, f32::min);
        let range = (max_val - min_val).max(0.01);

        let w = bounds.width;
        let h = bounds.height;
        let pad = 1.0;

        // Filled area
        let mut fill_builder = canvas::path::Builder::new();
        fill_builder.move_to(Point::new(0.0, h));
        for (i, &val) in self.data.iter().enumerate() {
            let x = (i as f32 / (n - 1) as f32) * w;
            let y = pad + (h - 2.0 * pad) * (1.0 - (val - min_val) / range);
            fill_builder.line_to(Point::new(x, y));
        }
        fill_builder.line_to(Point::new(w, h));
        fill_builder.close();
        let fill_path = fill_builder.build();
        let fill_color = Color::from_rgba(self.color.r, self.color.g, self.color.b, 0.15);
        frame.fill(&fill_path, fill_color);

        // Line
        let mut builder = canvas::path::Builder::new();
        for (i, &val) in self.data.iter().enumerate() {
            let x = (i as f32 / (n - 1) as f32) * w;
            let y = pad + (h - 2.0 * pad) * (1.0 - (val - min_val) / range);
            if i == 0 {
                builder.move_to(Point::new(x, y));
            } else {
                builder.line_to(Point::new(x, y));
            }
        }
        let path = builder.build();
        frame.stroke(&path, Stroke::default().with_color(self.color).with_width(1.2));

        vec![frame.into_geometry()]
    }
}
