fn main() {
    std::process::exit(northmod::cli::run());
}
