mod chart;
mod client;
mod gauge;
mod metrics;
mod preferences;
mod protocol;
mod series;
mod stream;
pub mod theme;
mod ui;

use ui::SeatWatch;

fn main() -> iced::Result {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("seatwatch=info")),
        )
        .init();

    iced::application(SeatWatch::title, SeatWatch::update, SeatWatch::view)
        .subscription(SeatWatch::subscription)
        .theme(SeatWatch::theme)
        .window(iced::window::Settings {
            size: (1000.0, 720.0).into(),
            #[cfg(target_os = "linux")]
            platform_specific: iced::window::settings::PlatformSpecific {
                application_id: String::from("seatwatch"),
                ..Default::default()
            },
            ..Default::default()
        })
        .run_with(|| (SeatWatch::new(), iced::Task::none()))
}
