use crate::catalog::{CatalogSnapshot, Persona};
use crate::domain::cart::Cart;
use crate::domain::order::OrderRecord;
use crate::domain::product::Product;
use crate::domain::promotion::Promotion;
use crate::domain::session::{PendingItem, Session};
use crate::pricing::PromotionResult;
use crate::text::format_amount;

pub const CHOICE_CHECKOUT: &str = "ยืนยันสั่งซื้อ";
pub const CHOICE_VIEW_CART: &str = "ดูตะกร้า";
pub const CHOICE_CANCEL: &str = "ยกเลิก";

const BROWSE_LIMIT: usize = 10;

pub fn baht(amount: u64) -> String {
    format!("{} บาท", format_amount(amount))
}

pub fn cart_choices() -> Vec<String> {
    vec![CHOICE_CHECKOUT.to_owned(), CHOICE_VIEW_CART.to_owned(), CHOICE_CANCEL.to_owned()]
}

pub fn cart_summary(cart: &Cart, pricing: &PromotionResult) -> String {
    if cart.is_empty() {
        return empty_cart();
    }

    let mut lines = vec!["🛒 รายการในตะกร้า".to_owned()];
    for item in cart.items() {
        lines.push(format!("- {} x{} = {}", item.display_name(), item.quantity, baht(item.line_total())));
    }
    lines.push(format!("ยอดรวม {}", baht(pricing.subtotal)));
    for applied in &pricing.applied {
        lines.push(format!("ส่วนลด {} -{}", applied.description, baht(applied.discount)));
    }
    if pricing.total_discount > 0 {
        lines.push(format!("ยอดสุทธิ {}", baht(pricing.total)));
    }
    lines.join("\n")
}

pub fn empty_cart() -> String {
    "ตะกร้ายังว่างอยู่เลยค่ะ สนใจสินค้าตัวไหนพิมพ์ชื่อมาได้เลยนะคะ".to_owned()
}

pub fn cart_cleared() -> String {
    "ยกเลิกรายการทั้งหมดให้แล้วค่ะ ถ้าต้องการสั่งใหม่พิมพ์ชื่อสินค้าได้เลยนะคะ".to_owned()
}

pub fn variant_prompt(product: &Product) -> String {
    format!(
        "{} ราคา {} มีให้เลือก: {} ค่ะ ต้องการแบบไหนคะ",
        product.name,
        baht(product.unit_price),
        product.variants.join(" / ")
    )
}

pub fn variant_not_found(product: &Product) -> String {
    format!("ขอโทษค่ะ ไม่พบตัวเลือกนั้น {} มีให้เลือก: {} ค่ะ", product.name, product.variants.join(" / "))
}

pub fn quantity_prompt(pending: &PendingItem) -> String {
    format!(
        "{} ราคา {} ต้องการกี่ชิ้นคะ",
        pending_label(pending),
        baht(pending.product.unit_price)
    )
}

pub fn quantity_not_found() -> String {
    "รบกวนพิมพ์จำนวนเป็นตัวเลขนะคะ เช่น 2".to_owned()
}

pub fn quantity_too_large(max_quantity: u32, in_cart: u32) -> String {
    if in_cart == 0 {
        format!("สั่งได้ไม่เกิน {max_quantity} ชิ้นต่อรายการค่ะ รบกวนพิมพ์จำนวนใหม่นะคะ")
    } else {
        format!(
            "สั่งได้ไม่เกิน {max_quantity} ชิ้นต่อรายการค่ะ ตอนนี้ในตะกร้ามี {in_cart} ชิ้นแล้ว รบกวนพิมพ์จำนวนใหม่นะคะ"
        )
    }
}

pub fn item_added(name: &str, quantity: u32, cart: &Cart, pricing: &PromotionResult) -> String {
    format!(
        "เพิ่ม {name} จำนวน {quantity} ชิ้นลงตะกร้าแล้วค่ะ\n{}\nสั่งเพิ่มพิมพ์ชื่อสินค้าได้เลย หรือกดยืนยันสั่งซื้อนะคะ",
        cart_summary(cart, pricing)
    )
}

pub fn disambiguation(candidates: &[&Product]) -> String {
    let mut lines = vec!["หมายถึงสินค้าตัวไหนคะ".to_owned()];
    for (position, product) in candidates.iter().enumerate() {
        lines.push(format!("{}. {} ({})", position + 1, product.name, baht(product.unit_price)));
    }
    lines.join("\n")
}

pub fn delivery_request(session: &Session, pricing: &PromotionResult) -> String {
    format!("{}\n{}", cart_summary(&session.cart, pricing), missing_delivery_info(session))
}

pub fn missing_delivery_info(session: &Session) -> String {
    match (session.address.is_some(), session.phone.is_some()) {
        (false, false) => "รบกวนส่งที่อยู่จัดส่งและเบอร์โทรศัพท์ด้วยนะคะ".to_owned(),
        (true, false) => "ได้รับที่อยู่แล้วค่ะ รบกวนขอเบอร์โทรศัพท์ด้วยนะคะ".to_owned(),
        (false, true) => "ได้รับเบอร์โทรแล้วค่ะ รบกวนขอที่อยู่จัดส่งแบบเต็มด้วยนะคะ".to_owned(),
        (true, true) => "ได้รับข้อมูลจัดส่งครบแล้วค่ะ".to_owned(),
    }
}

pub fn address_too_short(min_chars: usize) -> String {
    format!("ที่อยู่ยังไม่ครบค่ะ รบกวนพิมพ์ที่อยู่เต็ม (อย่างน้อย {min_chars} ตัวอักษร) พร้อมรหัสไปรษณีย์นะคะ")
}

pub fn order_confirmation(order: &OrderRecord, snapshot: &CatalogSnapshot) -> String {
    let mut lines = vec![format!("ขอบคุณค่ะ รับออเดอร์ {} เรียบร้อยแล้ว", order.id)];
    for line in &order.lines {
        let name = match &line.variant {
            Some(variant) => format!("{} ({variant})", line.name),
            None => line.name.clone(),
        };
        lines.push(format!("- {name} x{} = {}", line.quantity, baht(line.line_total)));
    }
    if order.discount > 0 {
        lines.push(format!("ส่วนลด -{}", baht(order.discount)));
    }
    lines.push(format!("ยอดชำระ {}", baht(order.total)));
    lines.push(format!("จัดส่งที่: {}", order.address));
    lines.push(format!("เบอร์ติดต่อ: {}", order.phone));
    if !snapshot.payment_methods.is_empty() {
        lines.push(payment_methods(snapshot));
    }
    lines.join("\n")
}

pub fn staff_order_summary(order: &OrderRecord) -> String {
    let items = order
        .lines
        .iter()
        .map(|line| match &line.variant {
            Some(variant) => format!("{} ({variant}) x{}", line.product_code, line.quantity),
            None => format!("{} x{}", line.product_code, line.quantity),
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "🧾 ออเดอร์ใหม่ {} | ลูกค้า {} | {} | ยอด {} | {} | {}",
        order.id,
        order.customer_id,
        items,
        baht(order.total),
        order.phone,
        order.address
    )
}

pub fn payment_methods(snapshot: &CatalogSnapshot) -> String {
    if snapshot.payment_methods.is_empty() {
        return "เดี๋ยวแอดมินแจ้งช่องทางชำระเงินให้นะคะ".to_owned();
    }
    let mut lines = vec!["ช่องทางชำระเงินค่ะ".to_owned()];
    for method in &snapshot.payment_methods {
        if method.detail.is_empty() {
            lines.push(format!("- {}", method.method));
        } else {
            lines.push(format!("- {}: {}", method.method, method.detail));
        }
    }
    lines.join("\n")
}

pub fn promotions(active: &[&Promotion], pricing: Option<&PromotionResult>) -> String {
    if active.is_empty() {
        return "ตอนนี้ยังไม่มีโปรโมชั่นค่ะ".to_owned();
    }
    let mut lines = vec!["โปรโมชั่นตอนนี้ค่ะ".to_owned()];
    for promotion in active {
        lines.push(format!("- {}", promotion.one_line()));
    }
    if let Some(pricing) = pricing.filter(|pricing| pricing.total_discount > 0) {
        lines.push(format!("ตะกร้าตอนนี้ได้ส่วนลด {} ค่ะ", baht(pricing.total_discount)));
    }
    lines.join("\n")
}

pub fn identity(persona: &Persona, shop_name: Option<&str>) -> String {
    match shop_name {
        Some(shop) => format!("หนูชื่อ{} เป็นผู้ช่วยของ{}ค่ะ ยินดีช่วยเลือกสินค้าและรับออเดอร์นะคะ", persona.name, shop),
        None => format!("หนูชื่อ{} เป็นผู้ช่วยของร้านค่ะ ยินดีช่วยเลือกสินค้าและรับออเดอร์นะคะ", persona.name),
    }
}

pub fn category_listing(category: &str, products: &[&Product]) -> String {
    if products.is_empty() {
        return format!("ตอนนี้หมวด{category}ยังไม่มีสินค้าค่ะ");
    }
    let mut lines = vec![format!("สินค้าหมวด{category}ค่ะ")];
    for product in products.iter().take(BROWSE_LIMIT) {
        lines.push(format!("- {} {}", product.name, baht(product.unit_price)));
    }
    lines.join("\n")
}

pub fn catalog_overview(snapshot: &CatalogSnapshot) -> String {
    let categories = snapshot.categories();
    if categories.is_empty() {
        let mut lines = vec!["สินค้าของร้านค่ะ".to_owned()];
        for product in snapshot.products.iter().take(BROWSE_LIMIT) {
            lines.push(format!("- {} {}", product.name, baht(product.unit_price)));
        }
        return lines.join("\n");
    }
    format!("ร้านมีสินค้าหมวด {} ค่ะ สนใจหมวดไหนพิมพ์บอกได้เลยนะคะ", categories.join(", "))
}

/// A short note appended to digression answers so the customer knows where they were.
pub fn reminder(session: &Session) -> Option<String> {
    use crate::domain::session::Stage;

    match session.stage {
        Stage::Idle | Stage::Confirming => None,
        Stage::PickingVariant => session.pending.as_ref().map(|pending| {
            format!(
                "ตอนนี้กำลังเลือก{}อยู่นะคะ มีให้เลือก: {}",
                pending.product.name,
                pending.product.variants.join(" / ")
            )
        }),
        Stage::PickingQuantity => session
            .pending
            .as_ref()
            .map(|pending| format!("ยังรอจำนวนของ{}อยู่นะคะ พิมพ์เป็นตัวเลขได้เลยค่ะ", pending_label(pending))),
        Stage::CollectingDeliveryInfo => Some(missing_delivery_info(session)),
    }
}

pub fn invalid_for_stage(session: &Session) -> String {
    reminder(session).unwrap_or_else(|| "ยังไม่มีรายการที่ต้องกรอกข้อมูลจัดส่งค่ะ สนใจสินค้าตัวไหนพิมพ์ชื่อมาได้เลยนะคะ".to_owned())
}

pub fn unknown_request_instruction() -> String {
    "ลูกค้าพิมพ์ข้อความที่ร้านยังไม่มีข้อมูล ตอบอย่างสุภาพสั้นๆ ว่ายังไม่มีข้อมูลนี้ และชวนให้ลูกค้าบอกชื่อสินค้าหรือรายละเอียดเพิ่ม".to_owned()
}

fn pending_label(pending: &PendingItem) -> String {
    match &pending.variant {
        Some(variant) => format!("{} ({variant})", pending.product.name),
        None => pending.product.name.clone(),
    }
}
