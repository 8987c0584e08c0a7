use clap::Subcommand;
use wakebot_core::challenge::AnswerLabel;
use wakebot_core::storage::Database;
use wakebot_core::{ChallengeStore, Question};

#[derive(Subcommand)]
pub enum QuestionAction {
    /// Add a multiple-choice question
    Add {
        /// Question text
        prompt: String,
        /// Option A
        a: String,
        /// Option B
        b: String,
        /// Option C
        c: String,
        /// Option D
        d: String,
        /// Correct option (A-D)
        #[arg(long)]
        correct: String,
    },
    /// List stored questions
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a question
    Delete {
        /// Question ID
        id: i64,
    },
    /// Insert the starter questions if none are stored
    Seed,
}

pub fn run(action: QuestionAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;

    match action {
        QuestionAction::Add {
            prompt,
            a,
            b,
            c,
            d,
            correct,
        } => {
            let correct = AnswerLabel::parse(&correct)
                .ok_or_else(|| format!("correct option must be A, B, C or D, got '{correct}'"))?;
            let question = Question::new(prompt, [a, b, c, d], correct)?;
            let id = db.insert_question(&question)?;
            println!("Question created: {id}");
        }
        QuestionAction::List { json } => {
            let questions = db.list_questions()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&questions)?);
            } else if questions.is_empty() {
                println!("No questions (try `question seed`)");
            } else {
                for q in questions {
                    println!("{:>4}  {}", q.id, q.prompt);
                    for label in AnswerLabel::ALL {
                        let mark = if label == q.correct { '*' } else { ' ' };
                        println!("      {mark}{}) {}", label.as_str(), q.option(label));
                    }
                }
            }
        }
        QuestionAction::Delete { id } => {
            if !db.delete_question(id)? {
                return Err(format!("question not found: {id}").into());
            }
            println!("Question deleted: {id}");
        }
        QuestionAction::Seed => {
            let inserted = db.seed_questions()?;
            println!("Seeded {inserted} questions");
        }
    }
    Ok(())
}
