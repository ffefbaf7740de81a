// photo-frame entry point
//
// Boot sequence: logger -> clocks + heap -> RTOS timer -> config -> board -> panel
// -> radio/IP stack -> refresh loop (never returns).
//
// Everything runs on the single embassy executor provided by esp-rtos.
// The network runner is not a spawned task; the refresh loop drives it
// through `Link::drive` while it waits on the network or the timer.

#![no_std]
#![no_main]

use embassy_executor::Spawner;
use esp_backtrace as _;
use esp_hal::clock::CpuClock;
use esp_hal::delay::Delay;
use esp_hal::interrupt::software::SoftwareInterruptControl;
use esp_hal::timer::timg::TimerGroup;
use log::info;

use photo_frame::apps::FrameApp;
use photo_frame::board::Board;
use photo_frame::config::FrameConfig;
use photo_frame::net::Link;

extern crate alloc;

esp_bootloader_esp_idf::esp_app_desc!();

const HEAP_SIZE: usize = 256720;

#[esp_rtos::main]
async fn main(_spawner: Spawner) -> ! {
    esp_println::logger::init_logger_from_env();
    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);
    esp_alloc::heap_allocator!(size: HEAP_SIZE);

    info!("booting...");

    let timg0 = TimerGroup::new(unsafe { peripherals.TIMG0.clone_unchecked() });
    let sw_int = SoftwareInterruptControl::new(unsafe { peripherals.SW_INTERRUPT.clone_unchecked() });
    esp_rtos::start(timg0.timer0, sw_int.software_interrupt0);
    info!("rtos started.");

    let cfg = FrameConfig::from_env();
    info!(
        "config: {} every {} s, max {} bytes, {:?}",
        cfg.full_url(),
        cfg.update_secs,
        cfg.max_image_bytes,
        cfg.rotation
    );

    let mut board = match Board::init(peripherals) {
        Ok(b) => b,
        Err(e) => panic!("board init failed: {:?}", e),
    };
    let mut delay = Delay::new();
    let tft = &mut board.display.tft;
    if let Err(e) = tft.init(&mut delay).and_then(|()| tft.set_rotation(cfg.rotation)) {
        panic!("display init failed: {:?}", e);
    }
    info!("hardware initialized.");

    let mut link = match Link::new(board.wifi) {
        Ok(l) => l,
        Err(e) => panic!("network init failed: {}", e),
    };
    info!("network ready.");

    let stats = esp_alloc::HEAP.stats();
    info!("heap: {} / {} bytes used", stats.current_usage, HEAP_SIZE);

    let mut app = FrameApp::new(cfg, &link);
    app.run(&mut link, &mut board.display.tft).await
}
