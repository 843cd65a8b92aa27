use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    windowed_fetch::apps::run_fetch_speeds(std::env::args().skip(1))
}
