use crate::telegram::models::SendPoll;

pub const POLL_SIZE: usize = 10;
pub const NEXT_PAGE_INDEX: usize = 9;
pub const MAX_OPTION_TEXT: usize = 100;

pub const NEXT_PAGE_TEXT: &str = "Next page";
const ELLIPSIS: &str = "...";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResult {
    pub link: String,
    pub name: String,
    pub age: String,
    pub size: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSession {
    pub chat_id: i64,
    pub message_id: i64,
    pub results: Vec<SearchResult>,
    pub page: usize,
}

pub fn page_count(total: usize) -> usize {
    if total <= POLL_SIZE {
        1
    } else {
        total.div_ceil(NEXT_PAGE_INDEX)
    }
}

pub fn build_poll(chat_id: i64, reply_to: i64, page: usize, results: &[SearchResult]) -> SendPoll {
    let pages = page_count(results.len());
    let page = page.clamp(1, pages);

    let mut options = if pages == 1 {
        results.iter().map(option_text).collect::<Vec<_>>()
    } else {
        results
            .iter()
            .skip((page - 1) * NEXT_PAGE_INDEX)
            .take(NEXT_PAGE_INDEX)
            .map(option_text)
            .collect::<Vec<_>>()
    };
    if page < pages {
        options.push(NEXT_PAGE_TEXT.to_owned());
    }

    SendPoll {
        chat_id,
        question: format!("Page {page} from {pages}"),
        options,
        is_anonymous: false,
        is_closed: false,
        disable_notification: false,
        reply_to_message_id: Some(reply_to),
    }
}

pub fn option_text(result: &SearchResult) -> String {
    let name = result.name.trim();
    let text = join_present(&[name, &result.size, &result.age]);
    let total = text.chars().count();
    if total <= MAX_OPTION_TEXT {
        return text;
    }

    let name_len = name.chars().count();
    let overflow = total - MAX_OPTION_TEXT + ELLIPSIS.len();
    if overflow >= name_len {
        // size and age alone are too long; cut the line itself
        let head: String = text.chars().take(MAX_OPTION_TEXT - ELLIPSIS.len()).collect();
        return format!("{head}{ELLIPSIS}");
    }
    let short_name: String = name.chars().take(name_len - overflow).collect();
    join_present(&[&format!("{short_name}{ELLIPSIS}"), &result.size, &result.age])
}

fn join_present(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
