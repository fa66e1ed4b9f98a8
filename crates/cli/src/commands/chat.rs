use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;

use chatcart_agent::{Collaborators, ConversationRuntime, InboundMessage, RuntimeSettings};
use chatcart_core::audit::InMemoryAuditSink;
use chatcart_core::catalog::{CatalogSource, CatalogStore, CatalogView, FileCatalogSource};
use chatcart_core::collaborators::{InMemoryOrderSink, InMemoryStaffNotifier, LiteralToneGenerator};
use chatcart_core::domain::session::CustomerId;
use chatcart_core::flows::{ConversationEngine, ConversationSettings};
use chatcart_core::orders::{OrderFinalizer, SequentialOrderIds};
use chatcart_core::pricing::DeterministicPricingEngine;
use chatcart_core::sessions::InMemorySessionStore;

use crate::commands::{block_on, CommandResult};

const QUIT: &str = "/quit";

pub fn run(catalog_path: &Path, customer: &str) -> CommandResult {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    run_with_io(catalog_path, customer, stdin.lock(), stdout.lock())
}

/// Drives the full runtime from `input` lines until EOF or `/quit`. Orders and
/// staff notifications stay in memory and are echoed to `output`.
pub fn run_with_io<R: BufRead, W: Write>(
    catalog_path: &Path,
    customer: &str,
    input: R,
    output: W,
) -> CommandResult {
    match block_on("chat", session(catalog_path, customer, input, output)) {
        Ok(result) => result,
        Err(failure) => failure,
    }
}

async fn session<R: BufRead, W: Write>(
    catalog_path: &Path,
    customer: &str,
    input: R,
    mut output: W,
) -> CommandResult {
    let source = FileCatalogSource::new(catalog_path);
    let catalog = match load_catalog(&source).await {
        Ok(catalog) => catalog,
        Err(message) => return CommandResult::failure("chat", "catalog_invalid", message, 2),
    };

    let orders = Arc::new(InMemoryOrderSink::default());
    let notifier = Arc::new(InMemoryStaffNotifier::default());
    let runtime = ConversationRuntime::new(
        ConversationEngine::new(
            DeterministicPricingEngine,
            OrderFinalizer::new(Arc::new(SequentialOrderIds::default())),
            ConversationSettings::default(),
        ),
        Arc::new(catalog),
        Arc::new(InMemorySessionStore::default()),
        Collaborators {
            orders: orders.clone(),
            notifier: notifier.clone(),
            tone: Arc::new(LiteralToneGenerator),
            audit: Arc::new(InMemoryAuditSink::default()),
        },
        RuntimeSettings::default(),
    );

    let customer_id = CustomerId(customer.to_owned());
    let mut turns = 0_usize;
    let mut notified = 0_usize;
    let _ = writeln!(output, "chatting as {customer} with {} (type {QUIT} to exit)", source.describe());

    for line in input.lines() {
        let Ok(line) = line else { break };
        let text = line.trim();
        if text == QUIT {
            break;
        }
        if text.is_empty() {
            continue;
        }

        let handled = runtime.handle_message(InboundMessage::new(customer_id.clone(), text)).await;
        if let Some(effects) = handled.effects {
            let _ = effects.await;
        }
        turns += 1;

        let _ = writeln!(output, "bot> {}", handled.reply.text.replace('\n', "\n     "));
        if !handled.reply.quick_choices.is_empty() {
            let _ = writeln!(output, "     [{}]", handled.reply.quick_choices.join(" | "));
        }
        let messages = notifier.messages();
        for message in &messages[notified..] {
            let _ = writeln!(output, "staff> {}", message.text().replace('\n', "\n       "));
        }
        notified = messages.len();
    }

    let placed = orders.orders();
    let _ = output.flush();
    CommandResult::success(
        "chat",
        format!("chat ended after {turns} messages with {} orders placed", placed.len()),
    )
}

async fn load_catalog(source: &FileCatalogSource) -> Result<CatalogStore, String> {
    let store = CatalogStore::new(CatalogView::empty(Utc::now()).map_err(|error| error.to_string())?);
    store.refresh(source).await.map_err(|error| error.to_string())?;
    Ok(store)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::run_with_io;

    fn demo_catalog() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../demos/catalog.toml")
    }

    #[test]
    fn scripted_chat_places_an_order_and_echoes_the_staff_summary() {
        let script = "หมูกรอบ\n2\nยืนยัน\n99/1 ซอยสุขุมวิท 11 กรุงเทพ 10110 0812345678\n/quit\nไม่ควรถูกอ่าน\n";
        let mut output = Vec::new();

        let result = run_with_io(&demo_catalog(), "U-local", script.as_bytes(), &mut output);

        assert_eq!(result.exit_code, 0);
        assert!(result.output.contains("after 4 messages with 1 orders placed"));
        let transcript = String::from_utf8(output).expect("utf8 transcript");
        assert!(transcript.contains("ORD-"));
        assert!(transcript.contains("staff> "));
    }

    #[test]
    fn missing_catalog_fails_before_reading_input() {
        let result = run_with_io(
            &PathBuf::from("/nonexistent/catalog.toml"),
            "U-local",
            "สวัสดี\n".as_bytes(),
            Vec::new(),
        );

        assert_eq!(result.exit_code, 2);
    }
}
