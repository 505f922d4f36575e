use std::sync::Arc;

use anyhow::Context;
use icisk_agent::{
    Agent, AgentConfig, BoxedProvider, GraphContext, InMemoryNotebookStore, Interaction,
    InterruptPrompt, OpenAiProvider, RetryingProvider,
};
use tokio::io::{stdin, AsyncBufReadExt, BufReader};

/// Read one line from stdin. `None` on EOF.
async fn read_line() -> Result<Option<String>, icisk_agent::Error> {
    let mut line = String::new();
    let bytes = BufReader::new(stdin())
        .read_line(&mut line)
        .await
        .map_err(|e| icisk_agent::Error::Interaction(e.to_string()))?;
    if bytes == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = AgentConfig::load("icisk-agent.toml")?;
    let api_key = std::env::var("OPENAI_API_KEY").context("OPENAI_API_KEY is not set")?;
    let user_id = std::env::var("USER").unwrap_or_else(|_| "user".to_string());

    let mut provider = OpenAiProvider::new(api_key, &config.provider.model);
    if let Some(base_url) = &config.provider.base_url {
        provider = provider.with_base_url(base_url);
    }
    let provider: BoxedProvider = match &config.provider.retry {
        Some(retry) => Arc::new(RetryingProvider::new(provider, retry.clone())),
        None => Arc::new(provider),
    };

    let interaction: Arc<Interaction> = Arc::new(|prompt: InterruptPrompt| {
        Box::pin(async move {
            println!("\nagent> {}", prompt.content);
            print!("you> ");
            use std::io::Write;
            std::io::stdout().flush().ok();
            read_line().await?.ok_or_else(|| {
                icisk_agent::Error::Interaction("input closed during a tool interaction".into())
            })
        })
    });

    let ctx = GraphContext::new(
        provider,
        Arc::new(InMemoryNotebookStore::new()),
        interaction,
    )
    .with_max_tokens(config.graph.max_tokens);

    let mut agent = Agent::with_max_steps(ctx, user_id, config.graph.max_steps)?;

    println!("I-Cisk agent ready. Ctrl-D exits.");
    loop {
        print!("\nyou> ");
        use std::io::Write;
        std::io::stdout().flush().ok();
        let Some(line) = read_line().await? else {
            break;
        };
        if line.is_empty() {
            continue;
        }
        match agent.chat(&line).await {
            Ok(reply) => println!("agent> {reply}"),
            Err(e) => eprintln!("error: {e}"),
        }
    }

    Ok(())
}
