fn main() {
    println!("cargo:rerun-if-env-changed=LAMP_SERVER_HOST");
    println!("cargo:rerun-if-env-changed=LAMP_WIFI_SSID");
    println!("cargo:rerun-if-env-changed=LAMP_WIFI_PASS");

    // Host builds (tests, fuzzing) have no ESP-IDF environment to export.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
