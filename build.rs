fn main() {
    // ESP-IDF link arguments are only relevant for flash builds; host
    // builds (tests, CI) skip them.
    if std::env::var_os("CARGO_FEATURE_ESPIDF").is_some() {
        embuild::espidf::sysenv::output();
    }
}
