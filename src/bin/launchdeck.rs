use launchdeck::ui::{MessageBlock, OutputMode, PlainRenderer, Renderer};
use launchdeck::{parse_command, print_usage, run_command};

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let output_mode = OutputMode::from_env();
    let cmd = match parse_command(args) {
        Ok(cmd) => cmd,
        Err(err) => {
            let mut renderer = PlainRenderer::stderr(output_mode);
            let _ = renderer.error_block(
                &MessageBlock::new("Invalid command arguments", err.to_string())
                    .with_hint("Run `launchdeck --help` to see supported command forms"),
            );
            print_usage();
            std::process::exit(2);
        }
    };

    if let Err(err) = run_command(cmd) {
        tracing::error!("command failed: {err}");
        let mut renderer = PlainRenderer::stderr(output_mode);
        let _ = renderer.error_block(&MessageBlock::from_error("launchdeck failed", &err));
        std::process::exit(1);
    }
}
