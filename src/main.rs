fn main() -> Result<(), Box<dyn std::error::Error>> {
    gramfix::cli::main()
}
