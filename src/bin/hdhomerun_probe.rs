use hdhomerun_tuner::logging::{default_logger, init_logging, LogLevel};
use hdhomerun_tuner::manager::MODEL_PROPERTY;
use hdhomerun_tuner::{
    ControlSocket, DiscoverySocketPool, SystemInterfaces, TunerConfig, TunerManager, DEVICE_ID_WILDCARD,
    DEVICE_TYPE_TUNER,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn main() -> hdhomerun_tuner::Result<()> {
    init_logging();
    let logger = default_logger();

    // Usage: hdhomerun_probe [config.json] [--hold]
    let args: Vec<String> = std::env::args().skip(1).collect();
    let hold = args.iter().any(|a| a == "--hold");
    let config = match args.iter().find(|a| !a.starts_with("--")) {
        Some(path) => TunerConfig::load(path)?,
        None => TunerConfig::default(),
    };

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    let l = logger.clone();
    ctrlc::set_handler(move || {
        l.log(LogLevel::Info, "Main", "Shutting down...");
        r.store(false, Ordering::SeqCst);
    })
    .ok();

    let interfaces = Arc::new(SystemInterfaces);
    let mut pool = DiscoverySocketPool::new(&config, interfaces.clone(), logger.clone())?.with_cancel_flag(running.clone());
    let devices = pool.find_devices(0, DEVICE_TYPE_TUNER, DEVICE_ID_WILDCARD, config.max_devices);
    if devices.is_empty() {
        println!("No HDHomeRun tuners found");
    }

    for device in &devices {
        let mut control = ControlSocket::new(device.device_id, device.ip_address, &config, interfaces.clone(), logger.clone());
        let model = control.get(MODEL_PROPERTY);
        println!("{}", serde_json::json!({ "device": device, "model": model }));
    }

    if !hold {
        return Ok(());
    }

    let manager = TunerManager::from_config(&config)?;
    let Some(device) = manager.acquire_device() else {
        println!("No tuner could be acquired");
        return Ok(());
    };
    println!("Holding {} (Ctrl-C to release)", device);

    while running.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(200));
    }

    manager.release_device(&device);
    Ok(())
}
