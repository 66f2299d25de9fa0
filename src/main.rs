fn main() -> anyhow::Result<()> {
    rehabtrack_lib::run()
}
