use std::path::PathBuf;

use ember_winit_app::app::WinitApp;

fn main() {
    // 第一个参数为配置文件路径，缺省时使用工作区下的 ember.toml
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);

    if let Err(err) = WinitApp::run(config_path) {
        log::error!("fatal: {err:#}");
        log::logger().flush();
        std::process::exit(1);
    }
}
