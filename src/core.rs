//! Assembly and the minimal console surface. The real presentation layer is
//! an external collaborator; the chat loop here exists so the daemon can be
//! exercised end-to-end from a terminal.

use std::sync::Arc;

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;

use crate::careplan::{CarePlanService, NewPerson};
use crate::config::AppConfig;
use crate::llm::LlmClient;
use crate::memory::MemoryServiceClient;
use crate::orchestrator::TurnOrchestrator;
use crate::providers::OpenAiCompatibleProvider;
use crate::state::SqliteStateStore;
use crate::traits::{CareStore, MemoryStore, ModelProvider, PersonStore};

pub struct Runtime {
    pub store: Arc<dyn CareStore>,
    pub careplan: CarePlanService,
    pub orchestrator: TurnOrchestrator,
}

/// Wire the store, memory client, provider, and orchestrator from config.
pub async fn build(config: &AppConfig) -> anyhow::Result<Runtime> {
    let store: Arc<dyn CareStore> = Arc::new(SqliteStateStore::new(&config.state.db_path).await?);

    let memory: Arc<dyn MemoryStore> = Arc::new(MemoryServiceClient::new(
        &config.memory.base_url,
        config.memory.timeout_secs,
    )?);

    let provider: Arc<dyn ModelProvider> = Arc::new(
        OpenAiCompatibleProvider::new(
            &config.provider.base_url,
            &config.provider.api_key,
            config.turn.llm_timeout_secs,
        )
        .map_err(|e| anyhow::anyhow!(e))?,
    );

    let llm = LlmClient::new(
        provider,
        config.provider.models.primary.clone(),
        config.provider.models.fast.clone(),
        config.turn.llm_timeout_secs,
    );

    let careplan = CarePlanService::new(store.clone(), memory.clone());
    let orchestrator = TurnOrchestrator::new(
        store.clone(),
        memory,
        llm,
        config.turn.episodic_top_k,
    );

    Ok(Runtime {
        store,
        careplan,
        orchestrator,
    })
}

/// Enroll a person from the command line.
pub async fn run_enroll(config: AppConfig, username: &str, full_name: &str) -> anyhow::Result<()> {
    let runtime = build(&config).await?;
    let person = runtime
        .careplan
        .enroll(NewPerson {
            username: username.to_string(),
            full_name: full_name.to_string(),
            ..Default::default()
        })
        .await?;
    println!("Enrolled {} (id {})", person.username, person.id);
    Ok(())
}

/// Interactive chat loop for one person: opening greeting, then one
/// orchestrated turn per input line.
pub async fn run_chat(config: AppConfig, username: &str) -> anyhow::Result<()> {
    let runtime = build(&config).await?;

    let person = runtime
        .store
        .get_person_by_username(username)
        .await?
        .ok_or_else(|| {
            anyhow::anyhow!("No person '{}'. Enroll first: caremind enroll <username> <full name>", username)
        })?;
    if !person.active {
        anyhow::bail!("Person '{}' is deactivated", username);
    }

    info!(person = %person.username, "Starting chat session");

    let opening = runtime.orchestrator.process_opening(&person).await;
    println!("{}\n", opening.reply);

    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut lines = stdin.lines();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let line = match lines.next_line().await? {
            Some(line) => line,
            None => break,
        };
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if message == "/quit" || message == "/exit" {
            break;
        }
        if let Some(rest) = message.strip_prefix("/took ") {
            match runtime.careplan.log_dose(&person, rest.trim(), Utc::now()).await {
                Ok(_) => println!("Logged {} as taken.\n", rest.trim()),
                Err(e) => println!("{}\n", e),
            }
            continue;
        }

        let outcome = runtime.orchestrator.process_turn(&person, message).await;
        println!("{}\n", outcome.reply);

        for reminder in &outcome.side_effects.dose_reminders {
            println!("[reminder] {}", reminder);
        }
    }

    Ok(())
}
