use anyhow::Result;

fn main() -> Result<()> {
    plugindeck::cli::run()
}
