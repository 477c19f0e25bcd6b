use busy_lib::engine::PlatformParams;
use busy_lib::platform::Platform;

use crate::output::print_stat;

pub fn cmd_info() {
  println!("Host:");
  match Platform::current() {
    Some(platform) => print_stat("Platform", &platform.to_string()),
    None => print_stat("Platform", "not detected"),
  }
  let defaults = PlatformParams::default();
  print_stat("CPU", &defaults.cpu);
  print_stat("OS", &defaults.os);
  print_stat("Word size", &defaults.wordsize.to_string());
  print_stat("Toolchain", &defaults.toolchain);
}
