//! "say" command: stream one answer to stdout

use std::error::Error;
use std::io::{self, Write};

use crate::core::service::ApiService;

pub async fn run_say(service: &ApiService, prompt: Vec<String>) -> Result<(), Box<dyn Error>> {
    let prompt = prompt.join(" ");
    if prompt.trim().is_empty() {
        eprintln!("Usage: parley say <prompt>");
        std::process::exit(1);
    }

    let mut stdout = io::stdout();
    let result = service
        .stream_message(&prompt, &[], |chunk: &str| {
            // A closed stdout only loses the echo; the answer is still assembled.
            let _ = stdout.write_all(chunk.as_bytes());
            let _ = stdout.flush();
        })
        .await;

    match result {
        Ok(_) => {
            println!();
            Ok(())
        }
        Err(err) => {
            eprintln!("❌ {err}");
            std::process::exit(1);
        }
    }
}
