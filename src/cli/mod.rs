pub mod commands;

use std::io::{self, Write};
use std::sync::Arc;

use crate::cli::commands::{Commands, KbAction};
use crate::config::AppConfig;
use crate::conversation::Orchestrator;
use crate::llm::ProviderFactory;
use crate::session::SessionStore;
use crate::tools::{IngredientKb, OpenFoodFactsClient};

pub async fn run_cli(command: Commands, config_path: String) {
    match command {
        Commands::Serve => {
            panic!("Serve command should be intercepted by main.rs to boot actix-web");
        }
        Commands::Kb { action } => {
            let kb = IngredientKb::load();
            match action {
                KbAction::Search { query, limit } => {
                    let results = kb.search(&query, limit);
                    if results.is_empty() {
                        println!("No ingredients matched '{}'.", query);
                    } else {
                        for record in results {
                            println!("{} [{}] - {}", record.name, record.category, record.why_it_matters);
                        }
                    }
                }
                KbAction::Lookup { name } => match kb.lookup(&name) {
                    Some(record) => {
                        println!("Name:       {}", record.name);
                        println!("Aliases:    {}", record.aliases.join(", "));
                        println!("Category:   {}", record.category);
                        println!("Risk:       {}", record.risk_level);
                        println!("Confidence: {}", record.confidence);
                        println!("Why:        {}", record.why_it_matters);
                    }
                    None => eprintln!("'{}' not found in knowledge base.", name),
                },
                KbAction::Stats => {
                    let stats = kb.stats();
                    println!("Total ingredients: {}", stats.total_ingredients);
                    println!("By category:");
                    for (category, count) in &stats.categories {
                        println!("  {:<20} {}", category, count);
                    }
                }
            }
        }
        Commands::Chat => {
            let config = AppConfig::load(&config_path).expect("Failed to load config");
            run_repl(config).await;
        }
    }
}

/// Interactive chat against an in-process store and the configured provider.
/// The session lives only as long as the REPL.
async fn run_repl(config: AppConfig) {
    let provider = ProviderFactory::create_default(&config).expect("Failed to init LLM provider");
    let store = Arc::new(SessionStore::new());
    let kb = Arc::new(IngredientKb::load());
    let off = Arc::new(OpenFoodFactsClient::new(&config.openfoodfacts));
    let orchestrator = Orchestrator::new(store.clone(), provider, kb, off, config.chat.clone());

    let session_id = store.create();

    println!("--- NutriLens Terminal Chat ---");
    println!("Session: {}", session_id);
    println!("Type /exit to quit.");
    println!("-------------------------------");

    loop {
        print!("\nUser> ");
        io::stdout().flush().unwrap();

        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_err() {
            break;
        }
        let text = input.trim().to_string();

        if text.is_empty() {
            continue;
        }
        if text == "/exit" || text == "/quit" {
            break;
        }

        let (tx, mut rx) = tokio::sync::mpsc::channel::<String>(100);

        print!("NutriLens> ");
        io::stdout().flush().unwrap();

        let printer = tokio::spawn(async move {
            while let Some(chunk) = rx.recv().await {
                print!("{}", chunk);
                io::stdout().flush().unwrap();
            }
        });

        match orchestrator
            .chat_turn_streaming(Some(session_id), &text, tx)
            .await
        {
            Ok(_) => {}
            Err(e) => eprintln!("{}", e),
        }
        let _ = printer.await;
        println!();
    }
}
