use xenon_winit_app::app::WinitApp;

fn main() {
    xenon_crate_tools::init_log::init_log();
    tracy_client::Client::start();

    if let Err(e) = WinitApp::run() {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}
