//! Grounding prompts.
//!
//! The system prompt is static and provider-agnostic. The user prompt
//! renders each retrieved chunk as a numbered `FONTE n` block with its
//! filename and page, then the question, then the citation rule again.
//!
//! Prompts are written in Italian, the language of the platform's users.

use crate::models::RetrievalResult;

/// Average characters per page, used to estimate a page number from a
/// character offset when the chunk carries no page metadata.
pub const CHARS_PER_PAGE: usize = 3000;

/// The fixed answer given when no relevant material exists.
pub const NO_INFORMATION_ANSWER: &str = "Non ho trovato informazioni sufficienti nei documenti disponibili per rispondere a questa domanda. Ti consiglio di consultare un professionista o di caricare documentazione pertinente.";

const SYSTEM_PROMPT: &str = "Sei un assistente legale che risponde esclusivamente sulla base dei documenti forniti nel contesto.

Regole obbligatorie:
1. Usa SOLO le informazioni contenute nelle FONTI fornite. Non usare conoscenze esterne.
2. Se le fonti non contengono informazioni sufficienti, dichiaralo esplicitamente invece di tentare una risposta. Non inventare mai norme, articoli, date o importi.
3. Cita ogni affermazione fattuale con il formato [Doc: <nome file>, pag: <numero>]. Se il numero di pagina non e' indicato nella fonte, usa [Doc: <nome file>].
4. Rispondi in italiano, in modo chiaro e conciso.";

/// Page of a context: chunk metadata `page` if present, else estimated
/// from the start offset.
pub fn resolve_page(context: &RetrievalResult) -> u32 {
    context.page_hint().unwrap_or_else(|| estimate_page(context.start_offset))
}

/// 1-based page estimate for a character offset.
pub fn estimate_page(start_offset: usize) -> u32 {
    u32::try_from(start_offset / CHARS_PER_PAGE + 1).unwrap_or(u32::MAX)
}

pub fn build_system_prompt() -> &'static str {
    SYSTEM_PROMPT
}

/// Render the question and its contexts into the user turn.
pub fn build_user_prompt(query: &str, contexts: &[RetrievalResult]) -> String {
    if contexts.is_empty() {
        return format!(
            "Non sono disponibili fonti pertinenti per la seguente domanda.\n\n\
             DOMANDA: {}\n\n\
             Rispondi esattamente con: \"{}\"",
            query.trim(),
            NO_INFORMATION_ANSWER
        );
    }

    let mut out = String::from("CONTESTO:\n\n");
    for (i, ctx) in contexts.iter().enumerate() {
        out.push_str(&format!(
            "[FONTE {}] Documento: {} | Pagina: {}\n{}\n\n",
            i + 1,
            ctx.filename,
            resolve_page(ctx),
            ctx.content.trim()
        ));
    }
    out.push_str(&format!("DOMANDA: {}\n\n", query.trim()));
    out.push_str(
        "Ricorda: rispondi solo sulla base delle FONTI sopra e cita ogni affermazione \
         con [Doc: <nome file>, pag: <numero>].",
    );
    out
}
