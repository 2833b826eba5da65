//! Rule management on top of the store and the compiler

use chainwatch_core::{
    parse_rule_definition, ChainwatchResult, NewRule, Rule, RuleDefinition, RuleEvaluation,
    RuleId, ValidationError,
};
use chainwatch_database::RuleStore;
use rule_compiler::RuleCompiler;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument};

/// Creates, compiles and maintains user rules
#[derive(Clone)]
pub struct RuleService {
    store: Arc<dyn RuleStore>,
    compiler: RuleCompiler,
}

impl RuleService {
    pub fn new(store: Arc<dyn RuleStore>, compiler: RuleCompiler) -> Self {
        Self { store, compiler }
    }

    /// Compiles `text` and persists the result; nothing is stored on failure
    #[instrument(skip(self, text, name))]
    pub async fn compile_rule(
        &self,
        user_id: &str,
        text: &str,
        name: Option<&str>,
    ) -> ChainwatchResult<Rule> {
        let compiled = self.compiler.compile(text, name).await?;

        let rule = self
            .store
            .create_rule(NewRule {
                user_id: user_id.to_string(),
                name: compiled.name,
                description: compiled.description,
                original_text: Some(text.trim().to_string()),
                definition: compiled.definition,
            })
            .await?;

        info!(rule_id = %rule.id, name = %rule.name, "Compiled rule created");
        Ok(rule)
    }

    /// Validates a JSON definition and persists it
    #[instrument(skip(self, description, definition))]
    pub async fn create_rule(
        &self,
        user_id: &str,
        name: &str,
        description: &str,
        definition: &Value,
    ) -> ChainwatchResult<Rule> {
        let definition = parse_rule_definition(definition)?;
        self.create_rule_from_definition(user_id, name, description, definition)
            .await
    }

    pub async fn create_rule_from_definition(
        &self,
        user_id: &str,
        name: &str,
        description: &str,
        definition: RuleDefinition,
    ) -> ChainwatchResult<Rule> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::new("name", "rule name cannot be empty").into());
        }

        let rule = self
            .store
            .create_rule(NewRule {
                user_id: user_id.to_string(),
                name: name.to_string(),
                description: description.trim().to_string(),
                original_text: None,
                definition,
            })
            .await?;

        info!(rule_id = %rule.id, "Rule created");
        Ok(rule)
    }

    pub async fn get_rule(&self, user_id: &str, rule_id: RuleId) -> ChainwatchResult<Rule> {
        Ok(self.store.get_rule(user_id, rule_id).await?)
    }

    pub async fn list_rules(&self, user_id: &str) -> ChainwatchResult<Vec<Rule>> {
        Ok(self.store.list_rules(user_id).await?)
    }

    #[instrument(skip(self))]
    pub async fn set_rule_active(
        &self,
        user_id: &str,
        rule_id: RuleId,
        active: bool,
    ) -> ChainwatchResult<Rule> {
        Ok(self.store.set_rule_active(user_id, rule_id, active).await?)
    }

    /// Replaces the whole definition after validating it
    #[instrument(skip(self, definition))]
    pub async fn replace_rule_definition(
        &self,
        user_id: &str,
        rule_id: RuleId,
        definition: &Value,
    ) -> ChainwatchResult<Rule> {
        let definition = parse_rule_definition(definition)?;
        Ok(self
            .store
            .replace_rule_definition(user_id, rule_id, definition)
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn delete_rule(&self, user_id: &str, rule_id: RuleId) -> ChainwatchResult<()> {
        self.store.delete_rule(user_id, rule_id).await?;
        info!(rule_id = %rule_id, "Rule deleted");
        Ok(())
    }

    pub async fn list_evaluations(
        &self,
        user_id: &str,
        rule_id: RuleId,
        limit: usize,
    ) -> ChainwatchResult<Vec<RuleEvaluation>> {
        Ok(self.store.list_evaluations(user_id, rule_id, limit).await?)
    }
}
