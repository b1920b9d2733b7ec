use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Result;
use colored::*;

use crate::camera::Frame;
use crate::cart::CartState;
use crate::font;
use crate::session::SessionCommand;
use crate::types::{BoundingBox, DetectionFrame, Finger, ObjectDetection};

/// Consumer of per-tick results. Display only; nothing flows back into the pipeline.
pub trait RenderSink {
    fn on_frame(&mut self, image: &Frame, frame: &DetectionFrame, cart: &CartState);
    /// Receives the frozen cart when the session ends.
    fn on_checkout(&mut self, cart: &CartState);
    fn on_restart(&mut self) {}
}

pub fn receipt_lines(cart: &CartState) -> Vec<String> {
    let mut lines = Vec::with_capacity(cart.len() + 2);
    for (i, product) in cart.entries().iter().enumerate() {
        lines.push(format!("{:>3}. {:<24} {:>9.2}", i + 1, product.name, product.price));
    }
    lines.push("-".repeat(39));
    lines.push(format!("{:<28} {:>9.2}", "Total", cart.total()));
    lines
}

/// Box caption: class and confidence in percent.
pub fn object_label(object: &ObjectDetection) -> String {
    format!("{} {:.0}%", object.class, object.score * 100.0)
}

/// Running cart list shown while capturing.
pub fn cart_panel_lines(cart: &CartState) -> Vec<String> {
    let mut lines = Vec::with_capacity(cart.len() + 2);
    lines.push(format!("CART ({})", cart.len()));
    for product in cart.entries() {
        lines.push(format!("{} ${:.2}", product.name, product.price));
    }
    lines.push(format!("TOTAL ${:.2}", cart.total()));
    lines
}

pub fn print_receipt(cart: &CartState) {
    println!("{}", "========== Checkout ==========".bold().green());
    if cart.is_empty() {
        println!("{}", "Cart is empty".yellow());
    }
    for line in receipt_lines(cart) {
        println!("{}", line);
    }
}

/// Headless sink: structured logs per tick, receipt on checkout.
#[derive(Debug, Default)]
pub struct LogSink;

impl RenderSink for LogSink {
    fn on_frame(&mut self, _image: &Frame, frame: &DetectionFrame, cart: &CartState) {
        tracing::trace!(
            hand = frame.hand.is_some(),
            objects = frame.objects.len(),
            gesture = frame.gesture.as_ref().map(|g| g.name.as_str()),
            cart = cart.len(),
            "Frame"
        );
    }

    fn on_checkout(&mut self, cart: &CartState) {
        print_receipt(cart);
    }
}

const OBJECT_COLOR: u32 = 0x0000FF00; // Green
const IN_CART_COLOR: u32 = 0x0000FFFF; // Cyan
const HAND_BOX_COLOR: u32 = 0x00FF0000; // Red
const SKELETON_COLOR: u32 = 0x00DDA0DD; // Plum
const LANDMARK_COLOR: u32 = 0x00FFD700; // Gold
const POINTER_COLOR: u32 = 0x00FF4500;
const TEXT_COLOR: u32 = 0x00FFFFFF;
const PANEL_COLOR: u32 = 0x00202020;

const TEXT_SCALE: usize = 2;
const RECEIPT_SCALE: usize = 3;
const MARGIN: usize = 10;

pub struct WindowOutput {
    window: minifb::Window,
    buffer: Vec<u32>,
    width: usize,
    height: usize,
}

impl WindowOutput {
    pub fn new(title: &str, width: usize, height: usize) -> Result<Self> {
        let mut window = minifb::Window::new(
            title,
            width,
            height,
            minifb::WindowOptions {
                resize: true,
                ..minifb::WindowOptions::default()
            },
        ).map_err(|e| anyhow::anyhow!("Failed to create window: {}", e))?;

        window.set_target_fps(60);

        Ok(Self {
            window,
            buffer: vec![0; width * height],
            width,
            height,
        })
    }

    pub fn is_open(&self) -> bool {
        self.window.is_open()
    }

    /// Pumps window events and maps key presses to session commands.
    pub fn poll_commands(&mut self) -> Vec<SessionCommand> {
        if let Err(e) = self.present() {
            tracing::warn!(error = %e, "Window update failed");
        }
        let mut commands = Vec::new();
        for key in self.window.get_keys_pressed(minifb::KeyRepeat::No) {
            match key {
                minifb::Key::S => commands.push(SessionCommand::Start),
                minifb::Key::R => commands.push(SessionCommand::Restart),
                minifb::Key::Escape => commands.push(SessionCommand::Stop),
                _ => {}
            }
        }
        commands
    }

    fn present(&mut self) -> Result<()> {
        self.window
            .update_with_buffer(&self.buffer, self.width, self.height)
            .map_err(|e| anyhow::anyhow!("Window update failed: {}", e))
    }

    fn blit(&mut self, frame: &Frame) {
        let target_w = frame.width() as usize;
        let target_h = frame.height() as usize;
        if target_w != self.width || target_h != self.height {
            self.width = target_w;
            self.height = target_h;
        }
        if self.buffer.len() != self.width * self.height {
            self.buffer.resize(self.width * self.height, 0);
        }

        for (i, pixel) in frame.pixels().enumerate() {
            if i >= self.buffer.len() { break; }
            let r = pixel[0] as u32;
            let g = pixel[1] as u32;
            let b = pixel[2] as u32;
            self.buffer[i] = (r << 16) | (g << 8) | b;
        }
    }

    fn draw_point(&mut self, x: i64, y: i64, color: u32) {
        if x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height {
            let idx = y as usize * self.width + x as usize;
            if idx < self.buffer.len() {
                self.buffer[idx] = color;
            }
        }
    }

    fn draw_dot(&mut self, x: f32, y: f32, radius: i64, color: u32) {
        let (cx, cy) = (x as i64, y as i64);
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy <= radius * radius {
                    self.draw_point(cx + dx, cy + dy, color);
                }
            }
        }
    }

    fn draw_line(&mut self, from: (f32, f32), to: (f32, f32), color: u32) {
        // Bresenham
        let (mut x0, mut y0) = (from.0 as i64, from.1 as i64);
        let (x1, y1) = (to.0 as i64, to.1 as i64);
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        loop {
            self.draw_point(x0, y0, color);
            if x0 == x1 && y0 == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x0 += sx;
            }
            if e2 <= dx {
                err += dx;
                y0 += sy;
            }
        }
    }

    fn draw_rect(&mut self, bbox: &BoundingBox, color: u32) {
        let (tl, tr, bl, br) = (bbox.top_left(), bbox.top_right(), bbox.bottom_left(), bbox.bottom_right());
        self.draw_line(tl, tr, color);
        self.draw_line(tr, br, color);
        self.draw_line(br, bl, color);
        self.draw_line(bl, tl, color);
    }

    fn fill_rect(&mut self, x: usize, y: usize, w: usize, h: usize, color: u32) {
        let x_end = (x + w).min(self.width);
        let y_end = (y + h).min(self.height);
        for py in y.min(y_end)..y_end {
            let row = py * self.width;
            for px in x.min(x_end)..x_end {
                if let Some(pixel) = self.buffer.get_mut(row + px) {
                    *pixel = color;
                }
            }
        }
    }

    fn draw_text(&mut self, x: usize, y: usize, text: &str, color: u32, scale: usize) {
        font::draw_text_line(&mut self.buffer, self.width, self.height, x, y, text, color, scale);
    }

    /// Text on a filled background strip.
    fn draw_label(&mut self, x: usize, y: usize, text: &str, color: u32, background: u32) {
        let w = font::measure_text_width(text, TEXT_SCALE) + TEXT_SCALE;
        self.fill_rect(x, y, w, font::line_height(TEXT_SCALE), background);
        self.draw_text(x + TEXT_SCALE, y + TEXT_SCALE, text, color, TEXT_SCALE);
    }

    /// Lines stacked in a panel whose top-left corner is (x, y).
    fn draw_panel(&mut self, x: usize, y: usize, lines: &[String], scale: usize) {
        let line_h = font::line_height(scale);
        let w = Self::panel_width(lines, scale);
        self.fill_rect(x, y, w, line_h * lines.len() + scale, PANEL_COLOR);
        for (i, line) in lines.iter().enumerate() {
            self.draw_text(x + scale, y + scale + i * line_h, line, TEXT_COLOR, scale);
        }
    }

    fn panel_width(lines: &[String], scale: usize) -> usize {
        lines.iter().map(|l| font::measure_text_width(l, scale)).max().unwrap_or(0) + 2 * scale
    }

    fn dim(&mut self) {
        for px in self.buffer.iter_mut() {
            *px = (*px >> 2) & 0x003F3F3F;
        }
    }
}

impl RenderSink for WindowOutput {
    fn on_frame(&mut self, image: &Frame, frame: &DetectionFrame, cart: &CartState) {
        self.blit(image);

        for object in &frame.objects {
            let color = if cart.contains(&object.class) { IN_CART_COLOR } else { OBJECT_COLOR };
            self.draw_rect(&object.bbox, color);
            let x = object.bbox.x.max(0.0) as usize;
            let y = (object.bbox.y.max(0.0) as usize).saturating_sub(font::line_height(TEXT_SCALE));
            self.draw_label(x, y, &object_label(object), color, PANEL_COLOR);
        }

        if let Some(hand) = &frame.hand {
            self.draw_rect(&hand.bounding_box, HAND_BOX_COLOR);
            for finger in Finger::ALL {
                let chain = hand.landmarks.finger(finger);
                for pair in chain.windows(2) {
                    self.draw_line((pair[0].x, pair[0].y), (pair[1].x, pair[1].y), SKELETON_COLOR);
                }
            }
            for point in hand.landmarks.points() {
                self.draw_dot(point.x, point.y, 3, LANDMARK_COLOR);
            }
            let pointer = hand.landmarks.pointer();
            self.draw_dot(pointer.x, pointer.y, 5, POINTER_COLOR);
        }

        if let Some(gesture) = &frame.gesture {
            let y = self.height.saturating_sub(font::line_height(TEXT_SCALE) + MARGIN);
            let text = format!("{} {:.1}", gesture.name, gesture.score);
            self.draw_label(MARGIN, y, &text, LANDMARK_COLOR, PANEL_COLOR);
        }

        let lines = cart_panel_lines(cart);
        let x = self.width.saturating_sub(Self::panel_width(&lines, TEXT_SCALE) + MARGIN);
        self.draw_panel(x, MARGIN, &lines, TEXT_SCALE);

        if let Err(e) = self.present() {
            tracing::warn!(error = %e, "Window update failed");
        }
    }

    fn on_checkout(&mut self, cart: &CartState) {
        self.dim();
        let mut lines = vec!["CHECKOUT".to_string()];
        lines.extend(receipt_lines(cart));
        lines.push("[R] RESTART  [ESC] QUIT".to_string());
        let w = Self::panel_width(&lines, RECEIPT_SCALE);
        let h = font::line_height(RECEIPT_SCALE) * lines.len();
        let x = self.width.saturating_sub(w) / 2;
        let y = self.height.saturating_sub(h) / 2;
        self.draw_panel(x, y, &lines, RECEIPT_SCALE);
        if let Err(e) = self.present() {
            tracing::warn!(error = %e, "Window update failed");
        }
        print_receipt(cart);
    }
}

impl RenderSink for Rc<RefCell<WindowOutput>> {
    fn on_frame(&mut self, image: &Frame, frame: &DetectionFrame, cart: &CartState) {
        self.borrow_mut().on_frame(image, frame, cart);
    }

    fn on_checkout(&mut self, cart: &CartState) {
        self.borrow_mut().on_checkout(cart);
    }

    fn on_restart(&mut self) {
        self.borrow_mut().on_restart();
    }
}
