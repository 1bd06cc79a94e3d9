mod cmdline;
mod driver;

fn main() -> anyhow::Result<()> {
    driver::run()
}
