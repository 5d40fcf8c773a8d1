fn main() -> anyhow::Result<()> {
    live_stream_lib::run()
}
