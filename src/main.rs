fn main() {
    stackweave::cli::run();
}
