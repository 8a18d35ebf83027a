use addon_cli::exec;
use addon_common::error;

#[tokio::main]
async fn main() {
    match exec().await {
        Ok(_) => (),
        Err(e) => error!("Error: {}", e),
    }
}
