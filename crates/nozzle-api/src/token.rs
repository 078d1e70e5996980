use parking_lot::Mutex;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Length of a minted session token.
pub const TOKEN_LENGTH: usize = 15;

/// Signals use of an invalid (expired or unknown) token.
#[derive(Debug, Error)]
#[error("attempt to use invalid token")]
pub struct InvalidTokenError;

#[derive(Debug)]
struct TokenState {
    valid: bool,
    used_since_last_tick: bool,
}

/// A session token with an idle timeout.
///
/// A background task ticks at the idle interval. A tick that finds the
/// token unused since the previous one invalidates it, fires the expiry
/// callback exactly once, and exits. Once invalid, a token never becomes
/// valid again.
#[derive(Debug)]
pub struct Token {
    value: String,
    state: Mutex<TokenState>,
}

impl Token {
    /// Mints a valid token and spawns its idle-timeout task. The callback
    /// runs after `valid` has transitioned to false.
    pub fn mint<F>(idle_timeout: Duration, on_expire: F) -> Arc<Self>
    where
        F: FnOnce(Arc<Token>) + Send + 'static,
    {
        let token = Arc::new(Self {
            value: generate_token_value(),
            state: Mutex::new(TokenState {
                valid: true,
                used_since_last_tick: false,
            }),
        });

        // A zero-period interval would panic.
        let period = idle_timeout.max(Duration::from_secs(1));
        let timer = Arc::clone(&token);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick of an interval completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;

                let expired = {
                    let mut state = timer.state.lock();
                    if state.used_since_last_tick {
                        state.used_since_last_tick = false;
                        false
                    } else {
                        state.valid = false;
                        true
                    }
                };

                if expired {
                    on_expire(timer);
                    return;
                }
            }
        });

        token
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn is_valid(&self) -> bool {
        self.state.lock().valid
    }

    /// Marks the token used for the current idle window, or fails if it has
    /// already been invalidated.
    pub fn use_token(&self) -> Result<(), InvalidTokenError> {
        let mut state = self.state.lock();
        if !state.valid {
            return Err(InvalidTokenError);
        }
        state.used_since_last_tick = true;
        Ok(())
    }
}

fn generate_token_value() -> String {
    let rng = rand::thread_rng();
    rng.sample_iter(Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// Live session tokens, keyed by value.
///
/// The `/token` handler inserts, every other handler reads, and each
/// token's expiry callback removes its own entry.
#[derive(Debug, Default)]
pub struct TokenRegistry {
    tokens: Mutex<HashMap<String, Arc<Token>>>,
}

impl TokenRegistry {
    /// Mints a token whose expiry removes it from this registry.
    pub fn mint(self: &Arc<Self>, idle_timeout: Duration) -> Arc<Token> {
        let registry = Arc::clone(self);
        let token = Token::mint(idle_timeout, move |token| {
            debug!(token = %token.value(), "removing expired token");
            registry.remove(token.value());
        });

        self.tokens
            .lock()
            .insert(token.value().to_string(), Arc::clone(&token));
        token
    }

    pub fn get(&self, value: &str) -> Option<Arc<Token>> {
        self.tokens.lock().get(value).map(Arc::clone)
    }

    fn remove(&self, value: &str) {
        self.tokens.lock().remove(value);
    }

    pub fn len(&self) -> usize {
        self.tokens.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.lock().is_empty()
    }
}
