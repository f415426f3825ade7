//! Device drivers: terminal, keyboard, RTC.

pub mod keyboard;
pub mod rtc;
pub mod terminal;

pub fn init() {
    terminal::init();
    keyboard::init();
    rtc::init();
}
