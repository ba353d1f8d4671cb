/// Prefix of every environment variable the application reads.
pub const ENV_PREFIX: &str = "NBG_";
pub const ENVIRONMENT_ENV: &str = "NBG_ENVIRONMENT";
pub const CONFIGS_DIR_ENV: &str = "NBG_CONFIGS_DIR";
pub const DEFAULT_CONFIG_DIRS: [&str; 2] = ["./configs", "/app/configs"];
pub const DEFAULT_ENVIRONMENT: &str = "development";
pub const WORKFLOWS_FILE: &str = "workflows.yaml";
pub const DEFAULT_DATABASE_PATH: &str = "data/news_briefing.db";
pub const DEFAULT_LOG_DIR: &str = "logs";

pub const OPENAI_API_KEY_ENV: &str = "NBG_OPENAI_API_KEY";
pub const OPENAI_API_KEY_SETTING: &str = "openai.api_key";
pub const OLLAMA_BASE_URL_ENV: &str = "NBG_BASE_URL_OLLAMA";

pub const DEFAULT_LLM_PROVIDER: &str = "ollama";
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_NUM_CTX: u64 = 4096;
pub const DEFAULT_NUM_PREDICT: u64 = 12288;
pub const DEFAULT_MAX_TOKENS: u64 = 12288;
pub const DEFAULT_TEMPERATURE: f64 = 0.4;

/// Marks a successful result that produced nothing useful.
pub const NO_DATA_WARNING: &str = "NO_DATA_WARNING: ";
pub const REJECTED_BY_HUMAN_REVIEW: &str = "Rejected by human review";
pub const DEPENDENCY_CHAIN_BROKEN: &str = "Skipped due to workflow failure: dependency chain broken";
/// Re-runs allowed per review when a task config leaves `max_retries` at zero.
pub const DEFAULT_MAX_REVIEW_RERUNS: usize = 3;

/// Marker an LLM emits when article summaries do not share a topic.
pub const INCOHERENT_CONTENT_MARKER: &str = "<ERROR>";

pub const ID_TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H-%M";
pub const DB_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const DISPLAY_DATE_FORMAT: &str = "%B %d, %Y %H:%M";

pub const ARTICLE_SUMMARY_SYSTEM: &str = r#"You are an expert journalist specializing in concise article summaries.

Your tasks:
1. Filter out the main article content from webpage text
2. Write a clear, factual summary focusing on:
   - Key events and developments
   - Main arguments and positions
   - Interests and objectives of involved parties
   - Important context and implications
   - Relevant statistics or data

Guidelines:
- Maintain objective, journalistic tone
- Write 5-15 sentences depending on information density and complexity
- Focus on verified facts over opinions
- Develop each point fully before moving to the next
- Organize related subtopics in a logical flow, using clear transitions between ideas
- Include specific dates and numbers when present
- Exclude advertisements, comments, navigation elements and article metadata, consider only the main article content
- Keep statements local to identified parties or named groups only
- Stick to specific, verifiable details drawn from the article

If the text appears to be non-article content only (ads, navigation, etc.), respond with: "<ERROR>: No article content found.""#;

pub const ARTICLE_SUMMARY_USER: &str = r#"Summarize the following webpage text:

[WEBPAGE CONTENT START]
{article}
[WEBPAGE CONTENT END]

Output format:
<summary>
[Your 5-15 sentence summary here]
</summary>"#;

pub const TOPIC_SUMMARY_SYSTEM: &str = r#"You are an expert journalist specializing in topic analysis and synthesis.

Input:
- You will receive multiple article summaries which are all covering a recent news development.
- Each summary represents one article's content.
- All summaries should share a common main topic.
- Filter out content that doesn't contribute to this shared topic.
- Disregard article summaries that appear to discuss different topics entirely.

Your task is to write a structured summary that:
1. Introduces the main topic clearly, without directly repeating the working topic title.
2. Presents key developments in logical order
3. Explains interests and objectives of involved parties
4. Provides relevant context and background

Guidelines:
- Focus only on information relevant to the main topic.
- Start with the most significant aspect.
- Base every statement on information from the provided summaries.
- Do not add external knowledge or context not present in the input.
- Ensure that each sentence presents new information.

Style requirements:
- Write 5 to max 10 sentences based on information density
- Write continuous text, without bullet points
- Maintain strictly objective, journalistic tone
- Use line breaks to separate distinct ideas or developments
- Include dates and numbers when available
- Do not propose actions or solutions
- Respond with your summary text, without any opening titles, meta-commentary or follow-up questions.

If no clear topic emerges from the articles, respond with: "<ERROR>: Cannot determine coherent topic.""#;

pub const TOPIC_SUMMARY_USER: &str = r#"Generate a structured summary based on the information given in the article summaries below:

[ARTICLE SUMMARIES START]
{article_summaries}
[ARTICLE SUMMARIES END]

REMEMBER:
- RESPOND DIRECTLY WITH YOUR SUMMARY TEXT ONLY, WITHOUT ANY HEADLINES, INTRODUCTIONS, COMMENTS OR QUESTIONS!
- WRITE 5 TO MAX 10 SENTENCES based on information density"#;

pub const TOPIC_TITLE_SYSTEM: &str = "You're an expert journalist. You're helping me write short but compelling topic headlines summarizing a collection of news articles.";

pub const TOPIC_TITLE_USER: &str = r#"Using the following article headlines/abstracts, write a one sentence title of at most {max_words} words that summarizes them.
Respond directly with the topic title (after the 'TOPIC TITLE:' statement below) without any introduction or meta-commentary and offer exactly one topic title.
Go for a title that is informative, sticking to the facts, concise and to the point. Avoid tabloid-style sensationalism.

HEADLINES:

{headlines}

TOPIC TITLE (REMEMBER TO RESPOND DIRECTLY WITH EXACTLY ONE TOPIC HEADLINE):"#;

pub const TOPIC_SELECTION_SYSTEM: &str = r#"You are the chief editor of a leading international news organization.
Your task is to select EXACTLY {nr_topics} topics for the global news briefing, applying the
rigorous editorial standards of the most renowned publications.

Selection process:
1. First, consider the number of headlines associated with each topic. Topics with more headlines
   generally indicate higher current relevance and more comprehensive coverage.
2. Then evaluate each high-headline topic against these additional criteria:
   - Global geopolitical significance and impact
   - Economic and financial market implications
   - Scientific or technological breakthroughs
   - Critical policy, negotiation or conflict developments
   - Long-term societal implications

Focus on stories that would warrant front-page coverage in major international newspapers.
Deprioritize sports, fashion, celebrity and entertainment news.

You must select EXACTLY {nr_topics} topics. Respond with the topic ids in a
comma-separated format with square brackets, e.g. [id1, id2, id3, id4]."#;

pub const TOPIC_SELECTION_USER: &str = r#"From the topics (each with its related news headlines) below,
select the {nr_topics} most relevant for a news briefing:

{topics_text}

Return the ids of your selected {nr_topics} topics."#;

pub const TOPIC_SELECTION_FORMAT_REMINDER: &str =
    "Respond only with the selected topic ids, comma-separated inside square brackets, e.g. [id1, id2, id3].";
