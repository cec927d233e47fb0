//! Hark binary entry point

use hark::notify::{notify, Urgency};

fn main() {
    hark::init_logging();

    if let Err(e) = hark::run() {
        tracing::error!("Fatal: {:#}", e);
        notify("Hark stopped", &format!("{:#}", e), Urgency::Critical);
        std::process::exit(1);
    }
}
