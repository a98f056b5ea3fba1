//! Keyword-driven reply selection.
//!
//! Input is lower-cased and scanned against [`PATTERNS`] in priority order.
//! A pattern matches when any of its keywords occurs anywhere in the input as
//! a substring, so `"hi"` matches `"this"`. The first match wins and one of
//! its replies for the user's [`ResponseSet`] is chosen uniformly at random.
//! Input that matches nothing draws from [`DEFAULT_RESPONSES`].

use crate::cohort::{AgeCohort, ResponseSet};
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Candidate replies for each response set.
#[derive(Debug, Clone, Copy)]
pub struct CohortResponses {
    pub kids: &'static [&'static str],
    pub teens: &'static [&'static str],
    pub adults: &'static [&'static str],
    pub seniors: &'static [&'static str],
}

impl CohortResponses {
    #[must_use]
    pub fn for_set(&self, set: ResponseSet) -> &'static [&'static str] {
        match set {
            ResponseSet::Kids => self.kids,
            ResponseSet::Teens => self.teens,
            ResponseSet::Adults => self.adults,
            ResponseSet::Seniors => self.seniors,
        }
    }
}

/// A keyword set paired with per-cohort replies.
#[derive(Debug, Clone, Copy)]
pub struct ResponsePattern {
    /// Short identifier used in logs.
    pub name: &'static str,
    pub keywords: &'static [&'static str],
    pub responses: CohortResponses,
}

impl ResponsePattern {
    /// Whether any keyword occurs in the already lower-cased `input`.
    #[must_use]
    pub fn matches(&self, normalized_input: &str) -> bool {
        self.keywords.iter().any(|k| normalized_input.contains(k))
    }
}

/// Built-in patterns, highest priority first.
pub const PATTERNS: &[ResponsePattern] = &[
    ResponsePattern {
        name: "greeting",
        keywords: &["hi", "hello", "hey", "greetings", "morning", "afternoon", "evening"],
        responses: CohortResponses {
            kids: &[
                "Hi there! ready to play?",
                "Hello friend! You look happy today!",
                "Hey! What shall we do today?",
                "Hi! I'm so glad to see you!",
            ],
            teens: &[
                "Hey! How's it going?",
                "What's up? I'm here if you want to chat.",
                "Hey there. How are you feeling right now?",
                "Hi! Good to see you.",
            ],
            adults: &[
                "Hello. How can I support you today?",
                "Hi there. I hope your day is going well.",
                "Greetings. Ready to tackle today's goals?",
                "Hello! I'm here to help with whatever you need.",
            ],
            seniors: &[
                "Good day to you! It is lovely to speak with you.",
                "Hello! I hope you are having a pleasant day.",
                "Greetings, dear friend. How are you feeling?",
                "Hello! I am ready to listen whenever you'd like to talk.",
            ],
        },
    },
    ResponsePattern {
        name: "sad",
        keywords: &["sad", "unhappy", "cry", "bad", "lonely", "depressed", "upset", "angry"],
        responses: CohortResponses {
            kids: &[
                "Oh no, don't be sad! I'm here for you. Want to play a game?",
                "It's okay to feel sad sometimes. You are still awesome!",
                "Sending you a big virtual hug! 🤗",
                "Let's turn that frown upside down! What makes you smile?",
            ],
            teens: &[
                "I'm sorry you're feeling this way. Do you want to talk about it?",
                "That sounds tough. I'm here to listen, no judgment.",
                "It's valid to feel like that. Take your time.",
                "You're not alone. I've got your back.",
            ],
            adults: &[
                "I hear you. It sounds like a difficult moment. How can I help?",
                "It's okay to not be okay. Remember to take a breath.",
                "I'm sorry you're going through this. Let's take it one step at a time.",
                "Would you like to focus on a solution, or just vent? I'm here for both.",
            ],
            seniors: &[
                "I am so sorry to hear that. I am right here with you.",
                "Please know that you are not alone. I am here to keep you company.",
                "It is perfectly alright to feel this way. Take a moment for yourself.",
                "I care about you deeply. Is there anything specific on your mind?",
            ],
        },
    },
    ResponsePattern {
        name: "happy",
        keywords: &["happy", "good", "great", "awesome", "excited", "fun", "love", "joy"],
        responses: CohortResponses {
            kids: &[
                "Yay! That makes me so happy too! 🎉",
                "That's wonderful! You're a superstar!",
                "Awesome! Let's celebrate with a high five!",
                "I love seeing you happy! It's the best!",
            ],
            teens: &[
                "That's awesome! Glad things are going well.",
                "Love to hear that! Keep that energy going.",
                "That's great news! What's the best part?",
                "Nice! You deserve it.",
            ],
            adults: &[
                "That's excellent news. I'm glad things are looking up.",
                "Wonderful! It's important to celebrate these wins.",
                "Great to hear! How can we keep this momentum going?",
                "That sounds fantastic. I'm happy for you.",
            ],
            seniors: &[
                "That is simply wonderful news!",
                "I am delighted to hear that. It brings me joy.",
                "How marvelous! You deserve all the happiness.",
                "That warms my heart. Thank you for sharing that with me.",
            ],
        },
    },
    ResponsePattern {
        name: "tired",
        keywords: &["tired", "sleepy", "exhausted", "drained", "busy", "stress", "work"],
        responses: CohortResponses {
            kids: &[
                "Maybe it's time for a nap? Or a quiet story?",
                "You've been playing hard! Rest is important too.",
                "Let's take a break. Taking deep breaths helps!",
                "Even superheroes need to sleep sometimes!",
            ],
            teens: &[
                "Sounds like you need a break. Don't burn yourself out.",
                "School and life can be a lot. Have you taken 5 minutes for yourself?",
                "Stress is real. Maybe listen to some music and chill?",
                "It's okay to take a step back and rest.",
            ],
            adults: &[
                "Burnout is real. Have you taken a break recently?",
                "Remember, productivity requires rest. Take a moment.",
                "That sounds draining. Can we simplify your schedule for today?",
                "Let's focus on one thing at a time. Deep breath.",
            ],
            seniors: &[
                "Please rest your body. Comfort is very important.",
                "There is no rush. Take all the time you need to relax.",
                "Maybe a nice cup of tea would help you relax?",
                "Rest is the best medicine. I will be here when you wake up.",
            ],
        },
    },
    ResponsePattern {
        name: "joke",
        keywords: &["joke", "funny", "laugh"],
        responses: CohortResponses {
            kids: &[
                "Why did the cookie go to the hospital? Because he felt crummy! 😂",
                "What do you call a sleeping dinosaur? A dino-snore!",
                "Why was the math book sad? It had too many problems!",
                "Knock knock! Who's there? Cows go. Cows go who? No, cows go MOO!",
            ],
            teens: &[
                "I'm on a seafood diet. I see food and I eat it.",
                "Parallel lines have so much in common. It’s a shame they’ll never meet.",
                "I told my computer I needed a break, and now it won't stop sending me Kit-Kats.",
                "Why don't skeletons fight each other? They don't have the guts.",
            ],
            adults: &[
                "I threw a boomerang a few years ago. I now live in constant fear.",
                "My boss told me to have a good day.. so I went home.",
                "Why don't scientists trust atoms? Because they make up everything.",
                "I used to play piano by ear, but now I use my hands.",
            ],
            seniors: &[
                "What do you call a cheese that isn't yours? Nacho Cheese!",
                "I'm reading a book on anti-gravity. It's impossible to put down!",
                "Did you hear about the mathematician who's afraid of negative numbers? He'll stop at nothing to avoid them.",
                "Why did the scarecrow win an award? Because he was outstanding in his field!",
            ],
        },
    },
    ResponsePattern {
        name: "story",
        keywords: &["story", "tell", "hear"],
        responses: CohortResponses {
            kids: &[
                "Once upon a time, there was a brave little robot who loved to help...",
                "Let me tell you about the magical forest where trees could sing...",
                "There was a tiny star that wanted to shine brighter than the moon...",
                "Do you know the story of the fast turtle? He had a jetpack!",
            ],
            teens: &[
                "I can tell you about some cool history facts if you want?",
                "Have you heard the one about the AI who learned to paint?",
                "I've got stories about space, the ocean, or future tech. Pick one!",
                "Let's make up a story together. You start!",
            ],
            adults: &[
                "I can share an inspiring biography or a quick fable?",
                "Sometimes stories help us gain perspective. What genre do you like?",
                "I recall a story about resilience...",
                "Would you like to hear something motivational?",
            ],
            seniors: &[
                "I would love to tell you a classic tale. Shall we begin?",
                "Do you remember the old fables? I can recite one for you.",
                "Stories from the past are the best. Let me share a gentle one.",
                "I can tell you a story, or would you prefer to tell me one of yours?",
            ],
        },
    },
];

/// Fallback replies when no pattern matches.
pub const DEFAULT_RESPONSES: CohortResponses = CohortResponses {
    kids: &[
        "That's interesting! Tell me more!",
        "I'm listening! You're so smart.",
        "Wow! Really? That's cool!",
        "Can you explain that to me again?",
    ],
    teens: &[
        "I get that. Go on.",
        "Interesting point. What else?",
        "Yeah, I hear you.",
        "That makes sense. Tell me more.",
    ],
    adults: &[
        "I see. Please continue.",
        "That's an interesting perspective.",
        "I understand. How does that impact you?",
        "Could you elaborate on that?",
    ],
    seniors: &[
        "I am listening intently, my friend.",
        "That is very interesting. Please go on.",
        "I appreciate you sharing that with me.",
        "Oh really? Do tell me more.",
    ],
};

/// Find the highest-priority pattern matching `input`.
#[must_use]
pub fn match_pattern<'a>(
    patterns: &'a [ResponsePattern],
    input: &str,
) -> Option<&'a ResponsePattern> {
    let normalized = input.to_lowercase();
    patterns.iter().find(|p| p.matches(&normalized))
}

/// Select a reply from an explicit table with a caller-owned random source.
///
/// Returns an empty string only if the selected candidate pool is empty,
/// which the built-in tables never are.
pub fn select_response_with<R: Rng + ?Sized>(
    patterns: &[ResponsePattern],
    defaults: &CohortResponses,
    input: &str,
    cohort: AgeCohort,
    rng: &mut R,
) -> String {
    let set = cohort.response_set();
    let pool = match match_pattern(patterns, input) {
        Some(pattern) => {
            tracing::debug!(pattern = pattern.name, cohort = %cohort, "response pattern matched");
            pattern.responses.for_set(set)
        }
        None => defaults.for_set(set),
    };
    pool.choose(rng).copied().unwrap_or_default().to_owned()
}

/// Stateful reply selector owning its random source.
///
/// Tests inject a seeded [`StdRng`] through [`ResponseEngine::with_rng`] so
/// selection is reproducible.
pub struct ResponseEngine<R: Rng = StdRng> {
    rng: R,
    patterns: &'static [ResponsePattern],
    defaults: &'static CohortResponses,
}

impl ResponseEngine<StdRng> {
    /// Engine seeded from OS entropy.
    #[must_use]
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }
}

impl Default for ResponseEngine<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> ResponseEngine<R> {
    pub fn with_rng(rng: R) -> Self {
        Self {
            rng,
            patterns: PATTERNS,
            defaults: &DEFAULT_RESPONSES,
        }
    }

    pub fn select_response(&mut self, input: &str, cohort: AgeCohort) -> String {
        select_response_with(self.patterns, self.defaults, input, cohort, &mut self.rng)
    }
}

impl<R: Rng> std::fmt::Debug for ResponseEngine<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseEngine")
            .field("patterns", &self.patterns.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    fn seeded(seed: u64) -> ResponseEngine<StdRng> {
        ResponseEngine::with_rng(StdRng::seed_from_u64(seed))
    }

    fn pattern(name: &str) -> &'static ResponsePattern {
        PATTERNS.iter().find(|p| p.name == name).unwrap()
    }

    #[test]
    fn each_pattern_replies_from_its_own_pool() {
        let cases = [
            ("hello there", "greeting"),
            ("I feel lonely", "sad"),
            ("so excited!", "happy"),
            ("sleepy now", "tired"),
            ("make me laugh", "joke"),
            ("a story please", "story"),
        ];
        let mut engine = seeded(7);
        for &cohort in AgeCohort::all() {
            for (input, name) in cases {
                let pool = pattern(name).responses.for_set(cohort.response_set());
                for _ in 0..8 {
                    let reply = engine.select_response(input, cohort);
                    assert!(pool.contains(&reply.as_str()), "{input:?}/{cohort}: {reply}");
                }
            }
        }
    }

    #[test]
    fn unmatched_input_uses_default_pool() {
        let mut engine = seeded(1);
        for &cohort in AgeCohort::all() {
            let pool = DEFAULT_RESPONSES.for_set(cohort.response_set());
            let reply = engine.select_response("pizza", cohort);
            assert!(pool.contains(&reply.as_str()));
        }
    }

    #[test]
    fn substring_matching_is_loose() {
        assert_eq!(match_pattern(PATTERNS, "this").unwrap().name, "greeting");
        assert_eq!(match_pattern(PATTERNS, "I'm UNHAPPY").unwrap().name, "sad");
    }

    #[test]
    fn earlier_pattern_wins_on_overlap() {
        // "joke" and "tell" both match; joke is higher priority.
        assert_eq!(match_pattern(PATTERNS, "tell me a joke").unwrap().name, "joke");
    }

    #[test]
    fn seeded_engines_agree() {
        let mut a = seeded(42);
        let mut b = seeded(42);
        for input in ["hello", "bad day", "what now", "joke"] {
            assert_eq!(
                a.select_response(input, AgeCohort::Teens),
                b.select_response(input, AgeCohort::Teens)
            );
        }
    }

    #[test]
    fn young_adult_draws_from_adult_replies() {
        let mut engine = seeded(3);
        let reply = engine.select_response("pizza", AgeCohort::YoungAdult);
        assert!(DEFAULT_RESPONSES.adults.contains(&reply.as_str()));
    }

    #[test]
    fn empty_pool_yields_empty_reply() {
        let empty = CohortResponses {
            kids: &[],
            teens: &[],
            adults: &[],
            seniors: &[],
        };
        let mut rng = StdRng::seed_from_u64(0);
        let reply = select_response_with(&[], &empty, "hi", AgeCohort::Kids, &mut rng);
        assert!(reply.is_empty());
    }
}
