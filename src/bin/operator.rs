/// 操作员界面 (Operator GUI)
///
/// cargo run --release --bin operator
use macroquad::prelude::*;
use mimalloc::MiMalloc;
use multiuser_osc::config::DEFAULT_CONFIG_PATH;
use multiuser_osc::renderer::{OperatorApp, WINDOW_TITLE};
use multiuser_osc::{logging, SessionConfig};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn window_conf() -> Conf {
    Conf {
        window_title: WINDOW_TITLE.to_string(),
        window_width: 1000,
        window_height: 800,
        ..Default::default()
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    logging::init();
    let config = SessionConfig::load(DEFAULT_CONFIG_PATH);
    let mut app = OperatorApp::new(config);

    loop {
        if is_key_pressed(KeyCode::Escape) {
            break;
        }
        app.update();
        app.draw();
        app.draw_egui();
        next_frame().await;
    }

    app.shutdown();
}
