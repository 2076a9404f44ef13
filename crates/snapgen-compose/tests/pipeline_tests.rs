//! End-to-end behavior of the generation pipeline with a scripted backend

use std::sync::Arc;

use pretty_assertions::assert_eq;
use snapgen_compose::{Complexity, GenerationConfig, GenerationOptions, GenerationPath};
use snapgen_test_utils::{fenced_program_reply, setup_generator, setup_generator_with, ScriptedBackend};

/// A fully recognized request never reaches the backend
#[tokio::test]
async fn test_rule_based_turn() {
    let backend = Arc::new(ScriptedBackend::always("unused"));
    let generator = setup_generator(backend.clone());

    let outcome = generator
        .generate("turn right 90 degrees", &GenerationOptions::default())
        .await;

    assert_eq!(outcome.path, GenerationPath::RuleBased);
    assert_eq!(backend.calls(), 0);

    let chain = outcome.program.scripts()[0].chain();
    assert_eq!(chain[0].opcode, "whenGreenFlag");
    assert!(chain[0].is_hat_block);
    assert_eq!(chain[1].opcode, "turn");
    assert_eq!(chain[1].inputs["DEGREES"].as_f64(), Some(90.0));
    assert!(generator.validator().validate(&outcome.program).is_ok());
}

/// A key phrase in its own clause still picks the hat
#[tokio::test]
async fn test_key_trigger_hat() {
    let backend = Arc::new(ScriptedBackend::always("unused"));
    let generator = setup_generator(backend.clone());

    let outcome = generator
        .generate("when space key pressed, move 10 steps", &GenerationOptions::default())
        .await;

    assert_eq!(outcome.path, GenerationPath::RuleBased);
    let chain = outcome.program.scripts()[0].chain();
    assert_eq!(chain[0].opcode, "whenKeyPressed");
    assert_eq!(chain[0].inputs["KEY_OPTION"], "space");
    assert_eq!(chain[1].opcode, "forward");
    assert_eq!(chain[1].inputs["STEPS"].as_f64(), Some(10.0));
}

/// Unrecognized requests go to the backend once, then come from the cache
#[tokio::test]
async fn test_generative_result_is_cached() {
    let backend = Arc::new(ScriptedBackend::always(fenced_program_reply()));
    let generator = setup_generator(backend.clone());
    let options = GenerationOptions::default();

    let first = generator.generate("draw a colorful spiral pattern", &options).await;
    assert_eq!(first.path, GenerationPath::Generative);
    assert!(!first.program.is_error());
    assert_eq!(backend.calls(), 1);

    let second = generator
        .generate("  Draw a colorful SPIRAL pattern ", &options)
        .await;
    assert_eq!(second.path, GenerationPath::Cache);
    assert_eq!(second.program, first.program);
    assert_eq!(backend.calls(), 1);

    let metrics = generator.metrics();
    assert_eq!(metrics.requests, 2);
    assert_eq!(metrics.cache_hits, 1);
    assert_eq!(metrics.generative, 1);
    assert!((metrics.cache_hit_rate - 0.5).abs() < f64::EPSILON);
}

/// Different options are different cache entries
#[tokio::test]
async fn test_cache_key_includes_options() {
    let backend = Arc::new(ScriptedBackend::always(fenced_program_reply()));
    let generator = setup_generator(backend.clone());

    generator
        .generate("draw a spiral", &GenerationOptions::default())
        .await;
    let other = generator
        .generate(
            "draw a spiral",
            &GenerationOptions::new("Cat").with_complexity(Complexity::Advanced),
        )
        .await;

    assert_eq!(other.path, GenerationPath::Generative);
    assert_eq!(other.program.target_sprite(), "Cat");
    assert_eq!(backend.calls(), 2);
}

/// Garbage output exhausts the attempts and yields an uncached error program
#[tokio::test]
async fn test_garbage_backend_falls_back() {
    let backend = Arc::new(ScriptedBackend::always("I cannot help with that."));
    let generator = setup_generator_with(backend.clone(), GenerationConfig::default().with_max_attempts(3));

    let outcome = generator
        .generate("draw a colorful spiral pattern", &GenerationOptions::default())
        .await;

    assert_eq!(outcome.path, GenerationPath::Fallback);
    assert_eq!(backend.calls(), 3);

    let program = &outcome.program;
    assert!(program.is_error());
    let chain = program.scripts()[0].chain();
    assert_eq!(chain[0].opcode, "whenGreenFlag");
    assert_eq!(chain[1].opcode, "doSay");
    assert_eq!(
        program.payload.user_request.as_deref(),
        Some("draw a colorful spiral pattern")
    );

    // error programs are not cached
    generator
        .generate("draw a colorful spiral pattern", &GenerationOptions::default())
        .await;
    assert_eq!(backend.calls(), 6);
    assert_eq!(generator.cache_stats().entry_count, 0);
}

/// Incomplete intents are handed to the backend rather than guessed
#[tokio::test]
async fn test_incomplete_intent_goes_generative() {
    let backend = Arc::new(ScriptedBackend::always(fenced_program_reply()));
    let generator = setup_generator(backend.clone());

    let outcome = generator.generate("turn", &GenerationOptions::default()).await;

    assert_eq!(outcome.path, GenerationPath::Generative);
    assert_eq!(outcome.intents.len(), 1);
    assert_eq!(backend.calls(), 1);
}

/// The prompt carries the request, the sprite and the opcode catalog
#[tokio::test]
async fn test_prompt_contents() {
    let backend = Arc::new(ScriptedBackend::always(fenced_program_reply()));
    let generator = setup_generator(backend.clone());

    generator
        .generate("make the cat dance wildly", &GenerationOptions::new("Cat"))
        .await;

    let prompt = &backend.prompts()[0].prompt;
    assert!(prompt.contains("USER REQUEST: make the cat dance wildly"));
    assert!(prompt.contains("Cat"));
    assert!(prompt.contains("- MOTION:"));
}
